//! # courrier-client
//!
//! The facade the UI layer talks to. [`ChatClient`] owns the local store,
//! the outbox actor, the global retry processor, and the presence
//! coordinator; [`Conversation`] handles expose one conversation's live
//! merged view, delivery acknowledgements, drafts, and typing signal.

pub mod client;
pub mod conversation;

mod error;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::{ChatClient, ClientConfig};
pub use conversation::Conversation;
pub use error::ClientError;

/// Initialise structured logging for the application process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("courrier_client=debug,courrier_sync=debug,courrier_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
