//! Wire Protocol Messages

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Bookmark;

/// Identifier of a live transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Opaque participant identity chosen by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique id of a queued item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh, time-ordered id
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An item submitted by a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: ItemId,
    pub content_id: String,
    /// Participant who submitted the item
    pub owner: ParticipantId,
    /// Display name the owner submitted under
    pub owner_name: String,
    /// Optional human readable title
    pub title: Option<String>,
}

impl QueueItem {
    /// Name recorded in play history: the title if one was given
    pub fn history_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.content_id)
    }
}

/// A previously played item picked because nobody had anything queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPick {
    pub item_id: ItemId,
    pub content_id: String,
    pub display_name: String,
}

/// The item currently being rendered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NowPlaying {
    /// Dequeued from a participant's queue
    Queued(QueueItem),
    /// History fallback, has no owner
    History(HistoryPick),
}

impl NowPlaying {
    pub fn content_id(&self) -> &str {
        match self {
            NowPlaying::Queued(item) => &item.content_id,
            NowPlaying::History(pick) => &pick.content_id,
        }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            NowPlaying::Queued(item) => &item.item_id,
            NowPlaying::History(pick) => &pick.item_id,
        }
    }

    /// Owning participant, `None` for history picks
    pub fn owner(&self) -> Option<&ParticipantId> {
        match self {
            NowPlaying::Queued(item) => Some(&item.owner),
            NowPlaying::History(_) => None,
        }
    }

    pub fn is_history(&self) -> bool {
        matches!(self, NowPlaying::History(_))
    }

    /// Name recorded in play history for this item
    pub fn history_name(&self) -> &str {
        match self {
            NowPlaying::Queued(item) => item.history_name(),
            NowPlaying::History(pick) => &pick.display_name,
        }
    }
}

/// One participant's queue as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueView {
    pub identity: ParticipantId,
    pub display_name: String,
    pub wait_seconds: u64,
    pub items: Vec<QueueItem>,
}

/// Full state broadcast to every connection after each mutation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub current_item: Option<NowPlaying>,
    pub started_at: Option<DateTime<Utc>>,
    /// Every known participant in registration order
    pub queues: Vec<QueueView>,
}

/// Messages sent by participants and the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Bind this connection to a participant identity
    RegisterIdentity {
        identity: ParticipantId,
        display_name: String,
    },

    /// Bind this connection as the rendering host
    RegisterHost,

    /// Queue a URL or bare content id
    SubmitItem {
        url: String,
        display_name: Option<String>,
        title: Option<String>,
    },

    /// Ask to skip the current item
    SkipCurrent,

    /// Remove one of our own queued items
    WithdrawItem { item_id: ItemId },

    /// Host finished rendering the current item
    TrackFinished,

    // === Bookmarks ===
    SaveBookmark { content_id: String, name: String },

    DeleteBookmark { content_id: String },

    RenameBookmark { content_id: String, new_name: String },
}

impl ClientEvent {
    /// Check if this event is only accepted from the host connection
    pub fn requires_host(&self) -> bool {
        matches!(self, ClientEvent::TrackFinished)
    }

    /// Short name used in logs and failure reports
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterIdentity { .. } => "register-identity",
            ClientEvent::RegisterHost => "register-host",
            ClientEvent::SubmitItem { .. } => "submit-item",
            ClientEvent::SkipCurrent => "skip-current",
            ClientEvent::WithdrawItem { .. } => "withdraw-item",
            ClientEvent::TrackFinished => "track-finished",
            ClientEvent::SaveBookmark { .. } => "save-bookmark",
            ClientEvent::DeleteBookmark { .. } => "delete-bookmark",
            ClientEvent::RenameBookmark { .. } => "rename-bookmark",
        }
    }
}

/// Messages sent to participants and the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full state (broadcast)
    StateUpdate(StateSnapshot),

    /// The caller's bookmarks
    BookmarkList { bookmarks: Vec<Bookmark> },

    /// Host instruction to render an item
    PlayContent { content_id: String },

    /// Skip request was not authorized
    SkipDenied,

    /// Withdraw request did not match an item in the caller's queue
    RemoveDenied { item_id: ItemId },

    /// A store round trip failed; nothing was changed
    OperationFailed { operation: String, reason: String },

    /// Event not accepted from this connection
    Rejected { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let json = r#"{"type":"register-identity","identity":"u1","display_name":"Alice"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::RegisterIdentity {
                identity: ParticipantId::new("u1"),
                display_name: "Alice".to_string(),
            }
        );

        let json = r#"{"type":"submit-item","url":"https://youtu.be/abc"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::SubmitItem {
                url: "https://youtu.be/abc".to_string(),
                display_name: None,
                title: None,
            }
        );

        let event: ClientEvent = serde_json::from_str(r#"{"type":"track-finished"}"#).unwrap();
        assert!(event.requires_host());
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::RemoveDenied {
            item_id: ItemId::from("abc"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "remove-denied");
        assert_eq!(json["item_id"], "abc");

        let json = serde_json::to_value(ServerEvent::StateUpdate(StateSnapshot::default())).unwrap();
        assert_eq!(json["type"], "state-update");
        assert!(json["current_item"].is_null());
    }

    #[test]
    fn test_history_pick_has_no_owner() {
        let pick = NowPlaying::History(HistoryPick {
            item_id: ItemId::from("h1"),
            content_id: "cid".to_string(),
            display_name: "Song".to_string(),
        });
        assert!(pick.is_history());
        assert!(pick.owner().is_none());
        assert_eq!(pick.history_name(), "Song");

        let json = serde_json::to_value(&pick).unwrap();
        assert_eq!(json["source"], "history");
    }

    #[test]
    fn test_queued_history_name_falls_back_to_content_id() {
        let item = NowPlaying::Queued(QueueItem {
            item_id: ItemId::from("i1"),
            content_id: "cid".to_string(),
            owner: ParticipantId::new("u1"),
            owner_name: "Alice".to_string(),
            title: None,
        });
        assert_eq!(item.history_name(), "cid");
        assert_eq!(item.owner(), Some(&ParticipantId::new("u1")));
    }
}
