use thiserror::Error;

/// Failures reported by the remote collaborators (message stream and
/// low-latency ephemeral sync).
///
/// The split drives the retry policy: `Unreachable` feeds the backoff loop,
/// `Rejected` converts the entry to `Failed` immediately.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// Transient network failure. Retryable.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// Permanent rejection, e.g. conversation deleted or membership revoked.
    #[error("remote rejected the operation: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether retrying can ever succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
