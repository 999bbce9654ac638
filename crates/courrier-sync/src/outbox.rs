//! The outbound queue actor.
//!
//! Three writers race for the queue: the send path, the global retry
//! processor, and any screen-scoped retry. All of them go through the
//! [`Outbox`] handle, whose commands are applied one at a time by a single
//! tokio task owning the store connection, so no read-modify-write can
//! interleave. Every mutation is flushed to the durable store before the
//! reply is sent, and a change notification is broadcast per conversation
//! so open screens re-merge.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use courrier_shared::{ConversationId, LocalId, MessageBody};
use courrier_store::{Database, QueueEntry};

use crate::backoff;
use crate::error::{Result, SyncError};

enum OutboxCommand {
    Enqueue {
        conversation: ConversationId,
        body: MessageBody,
        reply: oneshot::Sender<Result<QueueEntry>>,
    },
    /// Remove after a confirmed remote write. Idempotent: replies `false`
    /// when the entry was already gone (lost dequeue race).
    Dequeue {
        local_id: LocalId,
        reply: oneshot::Sender<bool>,
    },
    ListEligible {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<QueueEntry>>,
    },
    RecordFailure {
        local_id: LocalId,
        error: String,
        permanent: bool,
    },
    /// Explicit user retry of a failed entry.
    RetryNow {
        local_id: LocalId,
        reply: oneshot::Sender<bool>,
    },
    /// Explicit user discard of a failed entry.
    Discard {
        local_id: LocalId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        conversation: ConversationId,
        reply: oneshot::Sender<Vec<QueueEntry>>,
    },
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboxCommand>,
    changes: broadcast::Sender<ConversationId>,
}

impl Outbox {
    /// Durably append a message and return its queue entry. The only
    /// operation whose storage failure is surfaced synchronously: the
    /// user is actively waiting on send.
    pub async fn enqueue(
        &self,
        conversation: ConversationId,
        body: MessageBody,
    ) -> Result<QueueEntry> {
        if body.is_empty() {
            return Err(SyncError::InvalidMessage("empty body".into()));
        }
        let (reply, rx) = oneshot::channel();
        self.send(OutboxCommand::Enqueue {
            conversation,
            body,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| SyncError::Stopped("outbox dropped reply".into()))?
    }

    /// Remove an entry after its remote write was confirmed.
    pub async fn dequeue(&self, local_id: LocalId) -> bool {
        self.request_bool(|reply| OutboxCommand::Dequeue { local_id, reply })
            .await
    }

    /// Entries whose backoff window has elapsed, oldest first.
    pub async fn list_eligible(&self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        let (reply, rx) = oneshot::channel();
        if self
            .send(OutboxCommand::ListEligible { now, reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Record a failed delivery attempt. Fire-and-forget: retry failures
    /// surface through the merged view, never synchronously.
    pub async fn record_failure(&self, local_id: LocalId, error: String, permanent: bool) {
        let _ = self
            .send(OutboxCommand::RecordFailure {
                local_id,
                error,
                permanent,
            })
            .await;
    }

    /// Reset a failed entry so it is immediately eligible again.
    pub async fn retry_now(&self, local_id: LocalId) -> bool {
        self.request_bool(|reply| OutboxCommand::RetryNow { local_id, reply })
            .await
    }

    /// Drop a failed entry at the user's request.
    pub async fn discard(&self, local_id: LocalId) -> bool {
        self.request_bool(|reply| OutboxCommand::Discard { local_id, reply })
            .await
    }

    /// Current pending entries for one conversation, oldest first.
    pub async fn snapshot(&self, conversation: ConversationId) -> Vec<QueueEntry> {
        let (reply, rx) = oneshot::channel();
        if self
            .send(OutboxCommand::Snapshot {
                conversation,
                reply,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribe to per-conversation change notifications.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConversationId> {
        self.changes.subscribe()
    }

    async fn send(&self, cmd: OutboxCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::Stopped("outbox actor gone".into()))
    }

    async fn request_bool(
        &self,
        make: impl FnOnce(oneshot::Sender<bool>) -> OutboxCommand,
    ) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(make(reply)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Spawn the queue actor over an open store handle.
pub fn spawn_outbox(db: Arc<Mutex<Database>>) -> Outbox {
    let (tx, rx) = mpsc::channel(256);
    let (changes, _) = broadcast::channel(256);
    let actor_changes = changes.clone();
    tokio::spawn(actor_loop(db, rx, actor_changes));
    Outbox { tx, changes }
}

async fn actor_loop(
    db: Arc<Mutex<Database>>,
    mut rx: mpsc::Receiver<OutboxCommand>,
    changes: broadcast::Sender<ConversationId>,
) {
    info!("outbox actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            OutboxCommand::Enqueue {
                conversation,
                body,
                reply,
            } => {
                let entry = QueueEntry::new(conversation, body);
                let result = {
                    let db = db.lock().expect("store lock");
                    db.insert_queue_entry(&entry)
                };
                match result {
                    Ok(()) => {
                        debug!(id = %entry.local_id, conversation = %conversation, "enqueued");
                        let _ = reply.send(Ok(entry));
                        let _ = changes.send(conversation);
                    }
                    Err(e) => {
                        warn!(conversation = %conversation, error = %e, "enqueue failed");
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }

            OutboxCommand::Dequeue { local_id, reply } => {
                let (removed, conversation) = {
                    let db = db.lock().expect("store lock");
                    let conversation = db
                        .get_queue_entry(local_id)
                        .ok()
                        .flatten()
                        .map(|e| e.conversation_id);
                    let removed = db.remove_queue_entry(local_id).unwrap_or_else(|e| {
                        warn!(id = %local_id, error = %e, "dequeue failed");
                        false
                    });
                    (removed, conversation)
                };
                if removed {
                    debug!(id = %local_id, "dequeued");
                    if let Some(conversation) = conversation {
                        let _ = changes.send(conversation);
                    }
                }
                let _ = reply.send(removed);
            }

            OutboxCommand::ListEligible { now, reply } => {
                let eligible = {
                    let db = db.lock().expect("store lock");
                    db.list_queue().unwrap_or_else(|e| {
                        warn!(error = %e, "queue read failed");
                        Vec::new()
                    })
                };
                let eligible = eligible
                    .into_iter()
                    .filter(|entry| backoff::is_eligible(entry, now))
                    .collect();
                let _ = reply.send(eligible);
            }

            OutboxCommand::RecordFailure {
                local_id,
                error,
                permanent,
            } => {
                let conversation = {
                    let db = db.lock().expect("store lock");
                    let Some(entry) = db.get_queue_entry(local_id).ok().flatten() else {
                        // Already dequeued by a racing success. Nothing to do.
                        continue;
                    };
                    let failed = permanent || backoff::at_ceiling(entry.retries + 1);
                    if failed {
                        warn!(id = %local_id, error = %error, permanent, "entry marked failed");
                    }
                    if let Err(e) =
                        db.record_queue_attempt(local_id, Utc::now(), Some(&error), failed)
                    {
                        warn!(id = %local_id, error = %e, "failed to record attempt");
                    }
                    entry.conversation_id
                };
                let _ = changes.send(conversation);
            }

            OutboxCommand::RetryNow { local_id, reply } => {
                let (reset, conversation) = {
                    let db = db.lock().expect("store lock");
                    let conversation = db
                        .get_queue_entry(local_id)
                        .ok()
                        .flatten()
                        .map(|e| e.conversation_id);
                    let reset = db.reset_queue_entry(local_id).unwrap_or_else(|e| {
                        warn!(id = %local_id, error = %e, "retry reset failed");
                        false
                    });
                    (reset, conversation)
                };
                if reset {
                    if let Some(conversation) = conversation {
                        let _ = changes.send(conversation);
                    }
                }
                let _ = reply.send(reset);
            }

            OutboxCommand::Discard { local_id, reply } => {
                let (removed, conversation) = {
                    let db = db.lock().expect("store lock");
                    let conversation = db
                        .get_queue_entry(local_id)
                        .ok()
                        .flatten()
                        .map(|e| e.conversation_id);
                    let removed = db.remove_queue_entry(local_id).unwrap_or_else(|e| {
                        warn!(id = %local_id, error = %e, "discard failed");
                        false
                    });
                    (removed, conversation)
                };
                if removed {
                    info!(id = %local_id, "failed entry discarded");
                    if let Some(conversation) = conversation {
                        let _ = changes.send(conversation);
                    }
                }
                let _ = reply.send(removed);
            }

            OutboxCommand::Snapshot {
                conversation,
                reply,
            } => {
                let entries = {
                    let db = db.lock().expect("store lock");
                    db.list_queue_for_conversation(conversation)
                        .unwrap_or_else(|e| {
                            warn!(conversation = %conversation, error = %e, "snapshot failed");
                            Vec::new()
                        })
                };
                let _ = reply.send(entries);
            }
        }
    }

    info!("outbox actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use courrier_shared::constants::RETRY_CEILING;

    fn open_outbox() -> (tempfile::TempDir, Outbox) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let outbox = spawn_outbox(Arc::new(Mutex::new(db)));
        (dir, outbox)
    }

    #[tokio::test]
    async fn enqueue_then_dequeue() {
        let (_dir, outbox) = open_outbox();
        let conversation = ConversationId::new();

        let entry = outbox
            .enqueue(conversation, MessageBody::text("salut"))
            .await
            .unwrap();
        assert_eq!(outbox.snapshot(conversation).await.len(), 1);

        assert!(outbox.dequeue(entry.local_id).await);
        // Losing the dequeue race is reported, not an error.
        assert!(!outbox.dequeue(entry.local_id).await);
        assert!(outbox.snapshot(conversation).await.is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_rejected_synchronously() {
        let (_dir, outbox) = open_outbox();
        let err = outbox
            .enqueue(ConversationId::new(), MessageBody::text(""))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn failure_ceiling_marks_entry_failed() {
        let (_dir, outbox) = open_outbox();
        let conversation = ConversationId::new();
        let entry = outbox
            .enqueue(conversation, MessageBody::text("x"))
            .await
            .unwrap();

        for _ in 0..RETRY_CEILING {
            outbox
                .record_failure(entry.local_id, "timeout".into(), false)
                .await;
        }

        let snapshot = outbox.snapshot(conversation).await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].failed);
        assert_eq!(snapshot[0].retries, RETRY_CEILING);
        // Failed entries no longer appear in the eligible sweep.
        assert!(outbox.list_eligible(Utc::now()).await.is_empty());

        // Explicit user retry resurrects it.
        assert!(outbox.retry_now(entry.local_id).await);
        assert_eq!(outbox.list_eligible(Utc::now()).await.len(), 1);
    }

    #[tokio::test]
    async fn permanent_rejection_fails_immediately() {
        let (_dir, outbox) = open_outbox();
        let conversation = ConversationId::new();
        let entry = outbox
            .enqueue(conversation, MessageBody::text("x"))
            .await
            .unwrap();

        outbox
            .record_failure(entry.local_id, "no longer a member".into(), true)
            .await;

        let snapshot = outbox.snapshot(conversation).await;
        assert!(snapshot[0].failed);
        assert_eq!(
            snapshot[0].last_error.as_deref(),
            Some("no longer a member")
        );

        assert!(outbox.discard(entry.local_id).await);
        assert!(outbox.snapshot(conversation).await.is_empty());
    }

    #[tokio::test]
    async fn change_notifications_carry_the_conversation() {
        let (_dir, outbox) = open_outbox();
        let conversation = ConversationId::new();
        let mut changes = outbox.subscribe_changes();

        outbox
            .enqueue(conversation, MessageBody::text("notif"))
            .await
            .unwrap();

        assert_eq!(changes.recv().await.unwrap(), conversation);
    }
}
