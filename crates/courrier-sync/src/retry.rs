//! The global retry processor.
//!
//! A single process-lifetime loop, independent of which screen is open:
//! every sweep it asks the outbox for eligible entries and attempts a
//! remote write for each. It is deliberately redundant with the
//! first-chance attempt on the send path -- both may race to deliver the
//! same entry, the remote write's idempotency on the client-local id and
//! the idempotent dequeue make the race harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courrier_shared::constants::RETRY_SWEEP_INTERVAL_SECS;
use courrier_shared::UserId;
use courrier_store::QueueEntry;

use crate::outbox::Outbox;
use crate::remote::{MessageStream, OutgoingMessage};

/// Identity stamped onto every outgoing write.
#[derive(Debug, Clone)]
pub struct SenderProfile {
    pub user: UserId,
    /// Display name attached in group conversations.
    pub display_name: Option<String>,
}

/// Run the retry loop until `shutdown_rx` fires.
///
/// Started once at client startup and never from a screen, so messages
/// queued while every conversation is closed still go out.
pub async fn start_retry_loop(
    outbox: Outbox,
    stream: Arc<dyn MessageStream>,
    sender: SenderProfile,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    info!("global retry processor started");

    let mut interval = tokio::time::interval(Duration::from_secs(RETRY_SWEEP_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                flush_eligible(&outbox, stream.as_ref(), &sender).await;
            }
            _ = shutdown_rx.recv() => {
                info!("global retry processor shutting down");
                break;
            }
        }
    }
}

/// One sweep: attempt every entry whose backoff window has elapsed.
pub async fn flush_eligible(outbox: &Outbox, stream: &dyn MessageStream, sender: &SenderProfile) {
    let eligible = outbox.list_eligible(Utc::now()).await;
    if eligible.is_empty() {
        return;
    }
    debug!(count = eligible.len(), "sweeping eligible queue entries");
    for entry in eligible {
        flush_entry(outbox, stream, sender, &entry).await;
    }
}

/// Attempt one entry. Returns `true` when the write was confirmed and the
/// entry dequeued. Failures never propagate to the caller: they land on
/// the entry and surface through the merged view.
pub async fn flush_entry(
    outbox: &Outbox,
    stream: &dyn MessageStream,
    sender: &SenderProfile,
    entry: &QueueEntry,
) -> bool {
    let outgoing = OutgoingMessage {
        local_id: entry.local_id,
        sender: sender.user.clone(),
        body: entry.body.clone(),
        sender_name: sender.display_name.clone(),
        composed_at: entry.enqueued_at,
    };

    match stream.write(entry.conversation_id, outgoing).await {
        Ok(record) => {
            debug!(id = %entry.local_id, server_id = %record.server_id, "delivery confirmed");
            outbox.dequeue(entry.local_id).await;
            true
        }
        Err(e) => {
            warn!(
                id = %entry.local_id,
                retries = entry.retries,
                error = %e,
                "delivery attempt failed"
            );
            outbox
                .record_failure(entry.local_id, e.to_string(), e.is_permanent())
                .await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::spawn_outbox;
    use crate::remote::memory::MemoryStream;
    use courrier_shared::{ConversationId, MessageBody};
    use courrier_store::Database;
    use std::sync::Mutex;

    fn profile() -> SenderProfile {
        SenderProfile {
            user: UserId::new("alice"),
            display_name: None,
        }
    }

    fn open_outbox() -> (tempfile::TempDir, Outbox) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, spawn_outbox(Arc::new(Mutex::new(db))))
    }

    #[tokio::test]
    async fn sweep_drains_the_queue_when_reachable() {
        let (_dir, outbox) = open_outbox();
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();

        for i in 0..3 {
            outbox
                .enqueue(conversation, MessageBody::text(format!("m{i}")))
                .await
                .unwrap();
        }

        flush_eligible(&outbox, &stream, &profile()).await;

        assert!(outbox.snapshot(conversation).await.is_empty());
        assert_eq!(stream.records(conversation).len(), 3);
    }

    #[tokio::test]
    async fn transient_failure_leaves_entry_for_next_window() {
        let (_dir, outbox) = open_outbox();
        let stream = MemoryStream::new();
        stream.set_offline(true);
        let conversation = ConversationId::new();

        outbox
            .enqueue(conversation, MessageBody::text("plus tard"))
            .await
            .unwrap();
        flush_eligible(&outbox, &stream, &profile()).await;

        let snapshot = outbox.snapshot(conversation).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].retries, 1);
        assert!(!snapshot[0].failed);
        // Freshly attempted: not eligible again until the backoff elapses.
        assert!(outbox.list_eligible(Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn double_flush_of_one_entry_writes_once() {
        let (_dir, outbox) = open_outbox();
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();

        let entry = outbox
            .enqueue(conversation, MessageBody::text("course"))
            .await
            .unwrap();

        // Global sweep and a screen-scoped retry racing on the same entry.
        assert!(flush_entry(&outbox, &stream, &profile(), &entry).await);
        assert!(flush_entry(&outbox, &stream, &profile(), &entry).await);

        // Two attempts reached the backend, the idempotent write kept one record.
        assert_eq!(stream.write_calls(), 2);
        assert_eq!(stream.records(conversation).len(), 1);
        assert!(outbox.snapshot(conversation).await.is_empty());
    }
}
