use thiserror::Error;

use courrier_shared::RemoteError;
use courrier_store::StoreError;

/// Errors produced by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local durable store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote collaborator failure.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The outbox actor is no longer running.
    #[error("Sync engine stopped: {0}")]
    Stopped(String),

    /// The payload cannot be sent (e.g. empty body).
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
