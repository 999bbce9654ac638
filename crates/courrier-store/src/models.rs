//! Domain model structs persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courrier_shared::{ConversationId, LocalId, MessageBody};

/// Durable, at-rest representation of a not-yet-confirmed message.
///
/// One row per send. The entry is removed only after a confirmed remote
/// write or an explicit user discard; `retries` only ever increases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    /// Client-local identifier, generated at compose time.
    pub local_id: LocalId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Payload to deliver.
    pub body: MessageBody,
    /// When the user pressed send. Doubles as the optimistic timestamp for
    /// ordering in the merged view until a server timestamp exists.
    pub enqueued_at: DateTime<Utc>,
    /// Number of delivery attempts so far.
    pub retries: u32,
    /// When the last attempt was made. `None` before the first attempt,
    /// which makes a fresh entry immediately eligible.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error string from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Terminal failure: retry ceiling exhausted or permanent rejection.
    /// The entry stays visible until the user discards or retries it.
    pub failed: bool,
}

impl QueueEntry {
    /// Build a fresh entry for a message composed now.
    pub fn new(conversation_id: ConversationId, body: MessageBody) -> Self {
        Self {
            local_id: LocalId::new(),
            conversation_id,
            body,
            enqueued_at: Utc::now(),
            retries: 0,
            last_attempt: None,
            last_error: None,
            failed: false,
        }
    }
}
