//! Tuned intervals and ceilings for the sync engine.

/// Base retry delay in seconds (doubles per attempt).
pub const RETRY_BASE_SECS: u64 = 1;

/// Cap on a single backoff delay in seconds.
pub const RETRY_MAX_BACKOFF_SECS: u64 = 32;

/// Attempts after which a queue entry is marked failed.
pub const RETRY_CEILING: u32 = 6;

/// Sweep interval of the global retry processor in seconds.
pub const RETRY_SWEEP_INTERVAL_SECS: u64 = 5;

/// Presence heartbeat interval in seconds.
pub const PRESENCE_HEARTBEAT_SECS: u64 = 25;

/// Seconds without user interaction before the client writes itself offline.
pub const PRESENCE_IDLE_SECS: u64 = 60;

/// A peer whose `last_active` is older than this renders offline, even if
/// its stored record still says online (crash without clean shutdown).
pub const PRESENCE_STALE_SECS: u64 = 2 * PRESENCE_HEARTBEAT_SECS + 10;

/// Keystroke debounce before the first `typing: true` write, in milliseconds.
pub const TYPING_DEBOUNCE_MS: u64 = 250;

/// Typing signal time-to-live in milliseconds. Enforced by both the writer
/// (pause -> `typing: false`) and every reader (stale records suppressed).
pub const TYPING_TTL_MS: u64 = 2_000;

/// How long a conversation must stay visible before its messages are
/// marked read, in milliseconds.
pub const READ_DWELL_MS: u64 = 600;

/// Default number of messages per remote subscription page.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
