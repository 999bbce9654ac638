//! # courrier-sync
//!
//! The offline-resilient delivery and synchronization engine.
//!
//! Sending is split into a durable enqueue (instant, optimistic) and an
//! asynchronous delivery loop (backoff, idempotent on the client-local id).
//! The merge step joins the live remote page with still-pending queue
//! entries into one ordered, deduplicated view; the delivery tracker drives
//! the `sending → sent → delivered → read` lifecycle with batched remote
//! updates; the presence/typing coordinator publishes heartbeat and
//! debounced typing signals with reader-side TTL enforcement.
//!
//! All queue mutations are serialized through the [`outbox::Outbox`] actor;
//! the remote collaborators are reached only through the [`remote`] traits.

pub mod backoff;
pub mod delivery;
pub mod merge;
pub mod outbox;
pub mod presence;
pub mod remote;
pub mod retry;
pub mod typing;

mod error;

pub use error::SyncError;
pub use merge::MessageView;
pub use outbox::Outbox;
pub use presence::{PresenceHandle, PresenceRecord};
pub use remote::{EphemeralSync, MessageStream, OutgoingMessage, RemoteMessage, StatusFilter};
pub use retry::SenderProfile;
pub use typing::{TypingPublisher, TypingRecord};
