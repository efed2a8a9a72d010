//! Jukebox - Core Library
//!
//! This library decides, every time the shared player goes idle, whose
//! submission plays next. It tracks participants and their queues, keeps
//! per-participant wait credit, falls back to play history when nobody has
//! anything queued, and gates who may skip or withdraw an item.

pub mod clock;
pub mod config;
pub mod content_id;
pub mod controller;
pub mod error;
pub mod jukebox;
pub mod room;
pub mod scheduler;
pub mod store;

// Re-exports for convenience
pub use clock::{Clock, SystemClock};
pub use config::{DisconnectPolicy, JukeboxConfig};
pub use content_id::extract_content_id;
pub use error::JukeboxError;
pub use jukebox::{EventSink, Jukebox, JukeboxStats};
pub use room::{ClientEvent, ConnectionId, NowPlaying, ParticipantId, ServerEvent, StateSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
