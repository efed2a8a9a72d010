//! Jukebox configuration

use std::time::Duration;

/// What happens to a participant when their last connection goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Keep the participant, their queue and their wait credit for the
    /// lifetime of the process
    #[default]
    Retain,
    /// Forget the participant and drop their queue once no connection is
    /// bound to the identity any more
    Purge,
}

/// Jukebox configuration
#[derive(Debug, Clone)]
pub struct JukeboxConfig {
    /// Participant lifetime on disconnect
    pub disconnect_policy: DisconnectPolicy,
    /// Force-advance a track that has been playing at least this long.
    /// `None` means a host that never reports completion keeps the track
    /// playing indefinitely.
    pub stall_timeout: Option<Duration>,
}

impl Default for JukeboxConfig {
    fn default() -> Self {
        Self {
            disconnect_policy: DisconnectPolicy::Retain,
            stall_timeout: None,
        }
    }
}

impl JukeboxConfig {
    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }
}
