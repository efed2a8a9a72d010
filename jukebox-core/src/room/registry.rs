//! Session Registry
//!
//! Maps live connections to participant identities and remembers which
//! connection is the host.

use std::collections::HashMap;

use tracing::{debug, info};

use super::protocol::{ConnectionId, ParticipantId};
use crate::config::DisconnectPolicy;

/// A known participant
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub identity: ParticipantId,
    pub display_name: String,
    /// Seconds spent waiting while other participants' items played
    pub wait_seconds: u64,
    /// Position in first-registration order, used to break wait ties
    registration_order: u64,
}

impl Participant {
    pub fn registration_order(&self) -> u64 {
        self.registration_order
    }
}

/// Wait credit handed out at the end of a track.
///
/// Kept so the credit can be taken back if the operation that granted it
/// fails further down.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaitCredit {
    pub recipients: Vec<ParticipantId>,
    pub seconds: u64,
}

/// Outcome of dropping a connection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unregistered {
    /// Identity the connection was bound to, if any
    pub identity: Option<ParticipantId>,
    /// Whether the connection was the host
    pub was_host: bool,
    /// Whether the participant record was forgotten
    pub purged: bool,
}

/// Connection and participant bookkeeping
#[derive(Debug, Default)]
pub struct SessionRegistry {
    participants: HashMap<ParticipantId, Participant>,
    connections: HashMap<ConnectionId, ParticipantId>,
    host: Option<ConnectionId>,
    next_registration: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a participant and bind the connection to it.
    ///
    /// Returns the identity the connection was bound to before, if it was a
    /// different one. The caller decides whether that identity is released.
    pub fn register(
        &mut self,
        connection: ConnectionId,
        identity: ParticipantId,
        display_name: String,
    ) -> Option<ParticipantId> {
        let previous = self.connections.insert(connection, identity.clone());

        let next_registration = &mut self.next_registration;
        let participant = self
            .participants
            .entry(identity.clone())
            .and_modify(|p| p.display_name.clone_from(&display_name))
            .or_insert_with(|| {
                let order = *next_registration;
                *next_registration += 1;
                info!("New participant: {} ({})", identity, display_name);
                Participant {
                    identity: identity.clone(),
                    display_name: display_name.clone(),
                    wait_seconds: 0,
                    registration_order: order,
                }
            });

        debug!("Bound {} to {}", connection, participant.identity);
        previous.filter(|old| *old != identity)
    }

    /// Make this connection the host, returning the host it replaced
    pub fn register_host(&mut self, connection: ConnectionId) -> Option<ConnectionId> {
        let previous = self.host.replace(connection);
        match previous {
            Some(old) if old != connection => info!("Host replaced: {} -> {}", old, connection),
            Some(_) => debug!("Host re-registered: {}", connection),
            None => info!("Host registered: {}", connection),
        }
        previous
    }

    /// Put back a host binding saved from `register_host`
    pub fn restore_host(&mut self, previous: Option<ConnectionId>) {
        self.host = previous;
    }

    pub fn resolve(&self, connection: ConnectionId) -> Option<&ParticipantId> {
        self.connections.get(&connection)
    }

    pub fn participant(&self, identity: &ParticipantId) -> Option<&Participant> {
        self.participants.get(identity)
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn is_host(&self, connection: ConnectionId) -> bool {
        self.host == Some(connection)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Drop a connection binding, applying the disconnect policy
    pub fn unregister(&mut self, connection: ConnectionId, policy: DisconnectPolicy) -> Unregistered {
        let was_host = self.is_host(connection);
        if was_host {
            self.host = None;
            info!("Host detached: {}", connection);
        }

        let identity = self.connections.remove(&connection);
        let purged = identity
            .as_ref()
            .is_some_and(|identity| self.release(identity, policy));

        Unregistered {
            identity,
            was_host,
            purged,
        }
    }

    /// Apply the disconnect policy to an identity that just lost a binding.
    ///
    /// Returns true if the participant was forgotten. Nothing happens while
    /// another connection is still bound to the identity.
    pub fn release(&mut self, identity: &ParticipantId, policy: DisconnectPolicy) -> bool {
        if policy != DisconnectPolicy::Purge || self.connections.values().any(|bound| bound == identity) {
            return false;
        }

        let purged = self.participants.remove(identity).is_some();
        if purged {
            info!("Participant purged: {}", identity);
        }
        purged
    }

    /// All participants, first-registered first
    pub fn participants_in_registration_order(&self) -> Vec<&Participant> {
        let mut list: Vec<&Participant> = self.participants.values().collect();
        list.sort_by_key(|p| p.registration_order);
        list
    }

    /// Credit every participant except `owner` with `seconds` of waiting
    pub fn credit_all_except(&mut self, owner: &ParticipantId, seconds: u64) -> WaitCredit {
        let mut recipients = Vec::new();
        if seconds == 0 {
            return WaitCredit { recipients, seconds };
        }

        for participant in self.participants.values_mut() {
            if &participant.identity != owner {
                participant.wait_seconds = participant.wait_seconds.saturating_add(seconds);
                recipients.push(participant.identity.clone());
            }
        }

        WaitCredit { recipients, seconds }
    }

    /// Take back a credit granted by `credit_all_except`
    pub fn revert_credit(&mut self, credit: &WaitCredit) {
        for identity in &credit.recipients {
            if let Some(participant) = self.participants.get_mut(identity) {
                participant.wait_seconds = participant.wait_seconds.saturating_sub(credit.seconds);
            }
        }
    }
}
