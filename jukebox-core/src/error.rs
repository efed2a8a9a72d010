//! Core error types

use crate::store::StoreError;

/// Errors that abort a single jukebox operation.
///
/// Denials (unauthorized skip, foreign withdraw) are not errors; they are
/// answered with a signal to the requester.
#[derive(Debug, thiserror::Error)]
pub enum JukeboxError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Connection is not registered")]
    NotRegistered,

    #[error("Only the host may report completion")]
    NotHost,
}
