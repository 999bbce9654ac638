//! Boundary traits for the externally-hosted collaborators.
//!
//! The engine never talks to a concrete backend: the ordered message
//! collection is reached through [`MessageStream`] and the low-latency
//! presence/typing service through [`EphemeralSync`]. The [`memory`]
//! module provides in-process implementations for tests and embedding.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use courrier_shared::{
    ConversationId, DeliveryStatus, LocalId, MessageBody, RemoteError, UserId,
};

use crate::presence::PresenceRecord;
use crate::typing::TypingRecord;

/// A message record as confirmed by the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteMessage {
    /// Server-assigned identifier.
    pub server_id: Uuid,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub body: MessageBody,
    /// Server-assigned timestamp, replacing the client's optimistic one.
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// The client-local id carried as metadata so the sender can correlate
    /// this record with its optimistic copy.
    pub local_id: LocalId,
    /// Sender display name, present in group conversations only.
    pub sender_name: Option<String>,
}

/// Payload of a remote write attempt.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub local_id: LocalId,
    pub sender: UserId,
    pub body: MessageBody,
    pub sender_name: Option<String>,
    /// The client-side compose timestamp, used by the server as a hint only.
    pub composed_at: DateTime<Utc>,
}

/// Predicate for a batched status update: every message in the
/// conversation not sent by `sender_not` and currently in one of `current`
/// advances in a single remote operation.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    pub sender_not: UserId,
    pub current: Vec<DeliveryStatus>,
}

/// One page pushed by a live subscription: the current top-N records,
/// already time-ordered by the remote store.
pub type Page = Vec<RemoteMessage>;

/// The externally-owned, ordered, appendable message collection.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Open a live subscription: the receiver yields the current top
    /// `limit` records immediately and again whenever the collection
    /// changes. Dropping the receiver ends the subscription.
    async fn subscribe(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> Result<mpsc::Receiver<Page>, RemoteError>;

    /// Append a message. Idempotent on the client-local id: writing the
    /// same `local_id` twice returns the already-confirmed record instead
    /// of creating a duplicate, so racing retry loops are harmless.
    async fn write(
        &self,
        conversation: ConversationId,
        outgoing: OutgoingMessage,
    ) -> Result<RemoteMessage, RemoteError>;

    /// Advance the status of every message matching `filter` in one
    /// operation. Returns the number of records updated.
    async fn update_status(
        &self,
        conversation: ConversationId,
        filter: StatusFilter,
        new_status: DeliveryStatus,
    ) -> Result<usize, RemoteError>;
}

/// The low-latency key/value service carrying presence and typing signals.
#[async_trait]
pub trait EphemeralSync: Send + Sync {
    async fn set_presence(&self, user: &UserId, record: PresenceRecord)
        -> Result<(), RemoteError>;

    async fn presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, RemoteError>;

    async fn set_typing(
        &self,
        conversation: ConversationId,
        user: &UserId,
        record: TypingRecord,
    ) -> Result<(), RemoteError>;

    async fn typing(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<Option<TypingRecord>, RemoteError>;

    /// Register a value the service writes on our behalf if this client's
    /// connection drops (crash / network loss). Best effort.
    async fn register_disconnect_write(
        &self,
        user: &UserId,
        record: PresenceRecord,
    ) -> Result<(), RemoteError>;
}
