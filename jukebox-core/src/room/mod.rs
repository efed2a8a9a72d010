//! Room
//!
//! Who is connected, what they have queued, and what is playing.

mod protocol;
mod queue;
mod registry;
mod state;

pub use protocol::*;
pub use queue::*;
pub use registry::*;
pub use state::*;
