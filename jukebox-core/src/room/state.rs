//! Playback State

use chrono::{DateTime, Utc};

use super::protocol::NowPlaying;

/// What the shared player is doing.
///
/// The current item and its start time only exist while playing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing {
        item: NowPlaying,
        started_at: DateTime<Utc>,
    },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn current_item(&self) -> Option<&NowPlaying> {
        match self {
            PlaybackState::Playing { item, .. } => Some(item),
            PlaybackState::Idle => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PlaybackState::Playing { started_at, .. } => Some(*started_at),
            PlaybackState::Idle => None,
        }
    }
}
