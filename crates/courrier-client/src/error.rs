use thiserror::Error;

use courrier_shared::RemoteError;
use courrier_store::StoreError;
use courrier_sync::SyncError;

/// Errors surfaced to the UI layer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
