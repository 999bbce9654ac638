//! In-process implementations of the remote collaborator traits.
//!
//! Used by the integration tests and by embedders that want the engine
//! without a hosted backend. [`MemoryStream`] can be toggled offline to
//! exercise the retry path, and counts write/batch calls so tests can
//! assert on call shapes, not just outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use courrier_shared::{ConversationId, DeliveryStatus, RemoteError, UserId};

use crate::presence::PresenceRecord;
use crate::remote::{
    EphemeralSync, MessageStream, OutgoingMessage, Page, RemoteMessage, StatusFilter,
};
use crate::typing::TypingRecord;

#[derive(Default)]
struct StreamInner {
    messages: HashMap<ConversationId, Vec<RemoteMessage>>,
    subscribers: HashMap<ConversationId, Vec<(usize, mpsc::Sender<Page>)>>,
}

/// In-memory ordered message collection.
#[derive(Default)]
pub struct MemoryStream {
    inner: Mutex<StreamInner>,
    offline: AtomicBool,
    write_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing / regaining the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total `write` attempts that reached the backend (including
    /// idempotent duplicates).
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Total `update_status` batch operations.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a conversation's records, oldest first.
    pub fn records(&self, conversation: ConversationId) -> Vec<RemoteMessage> {
        let inner = self.inner.lock().expect("stream lock");
        inner.messages.get(&conversation).cloned().unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unreachable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    /// Collect the senders to notify along with their current page, then
    /// push outside the lock.
    fn pending_notifications(
        &self,
        conversation: ConversationId,
    ) -> Vec<(mpsc::Sender<Page>, Page)> {
        let mut inner = self.inner.lock().expect("stream lock");
        let records = inner.messages.get(&conversation).cloned().unwrap_or_default();
        let Some(subs) = inner.subscribers.get_mut(&conversation) else {
            return Vec::new();
        };
        subs.retain(|(_, tx)| !tx.is_closed());
        subs.iter()
            .map(|(limit, tx)| (tx.clone(), page_of(&records, *limit)))
            .collect()
    }

    async fn notify(&self, conversation: ConversationId) {
        for (tx, page) in self.pending_notifications(conversation) {
            let _ = tx.send(page).await;
        }
    }
}

/// The top `limit` records of a time-ordered collection.
fn page_of(records: &[RemoteMessage], limit: usize) -> Page {
    let start = records.len().saturating_sub(limit);
    records[start..].to_vec()
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn subscribe(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> Result<mpsc::Receiver<Page>, RemoteError> {
        let (tx, rx) = mpsc::channel(16);
        let initial = {
            let mut inner = self.inner.lock().expect("stream lock");
            let records = inner.messages.get(&conversation).cloned().unwrap_or_default();
            inner
                .subscribers
                .entry(conversation)
                .or_default()
                .push((limit, tx.clone()));
            page_of(&records, limit)
        };
        let _ = tx.send(initial).await;
        Ok(rx)
    }

    async fn write(
        &self,
        conversation: ConversationId,
        outgoing: OutgoingMessage,
    ) -> Result<RemoteMessage, RemoteError> {
        self.check_online()?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let (record, duplicate) = {
            let mut inner = self.inner.lock().expect("stream lock");
            let records = inner.messages.entry(conversation).or_default();

            // Idempotency on the client-local id: a second write of the
            // same message returns the existing record.
            if let Some(existing) = records.iter().find(|m| m.local_id == outgoing.local_id) {
                (existing.clone(), true)
            } else {
                let record = RemoteMessage {
                    server_id: Uuid::new_v4(),
                    conversation_id: conversation,
                    sender: outgoing.sender,
                    body: outgoing.body,
                    timestamp: Utc::now(),
                    status: DeliveryStatus::Sent,
                    local_id: outgoing.local_id,
                    sender_name: outgoing.sender_name,
                };
                records.push(record.clone());
                (record, false)
            }
        };

        if !duplicate {
            self.notify(conversation).await;
        }
        Ok(record)
    }

    async fn update_status(
        &self,
        conversation: ConversationId,
        filter: StatusFilter,
        new_status: DeliveryStatus,
    ) -> Result<usize, RemoteError> {
        self.check_online()?;
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let updated = {
            let mut inner = self.inner.lock().expect("stream lock");
            let records = inner.messages.entry(conversation).or_default();
            let mut updated = 0;
            for record in records.iter_mut() {
                if record.sender != filter.sender_not
                    && filter.current.contains(&record.status)
                    && record.status.can_advance_to(new_status)
                {
                    record.status = new_status;
                    updated += 1;
                }
            }
            updated
        };

        if updated > 0 {
            self.notify(conversation).await;
        }
        Ok(updated)
    }
}

#[derive(Default)]
struct EphemeralInner {
    presence: HashMap<UserId, PresenceRecord>,
    typing: HashMap<(ConversationId, UserId), TypingRecord>,
    disconnect_writes: HashMap<UserId, PresenceRecord>,
}

/// In-memory presence/typing service.
#[derive(Default)]
pub struct MemoryEphemeral {
    inner: Mutex<EphemeralInner>,
}

impl MemoryEphemeral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the registered disconnect-write for a user, as the hosted
    /// service would after losing the client's connection.
    pub fn simulate_disconnect(&self, user: &UserId) {
        let mut inner = self.inner.lock().expect("ephemeral lock");
        if let Some(record) = inner.disconnect_writes.get(user).copied() {
            inner.presence.insert(user.clone(), record);
        }
    }
}

#[async_trait]
impl EphemeralSync for MemoryEphemeral {
    async fn set_presence(
        &self,
        user: &UserId,
        record: PresenceRecord,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().expect("ephemeral lock");
        inner.presence.insert(user.clone(), record);
        Ok(())
    }

    async fn presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, RemoteError> {
        let inner = self.inner.lock().expect("ephemeral lock");
        Ok(inner.presence.get(user).copied())
    }

    async fn set_typing(
        &self,
        conversation: ConversationId,
        user: &UserId,
        record: TypingRecord,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().expect("ephemeral lock");
        inner.typing.insert((conversation, user.clone()), record);
        Ok(())
    }

    async fn typing(
        &self,
        conversation: ConversationId,
        user: &UserId,
    ) -> Result<Option<TypingRecord>, RemoteError> {
        let inner = self.inner.lock().expect("ephemeral lock");
        Ok(inner.typing.get(&(conversation, user.clone())).copied())
    }

    async fn register_disconnect_write(
        &self,
        user: &UserId,
        record: PresenceRecord,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().expect("ephemeral lock");
        inner.disconnect_writes.insert(user.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courrier_shared::{LocalId, MessageBody};

    fn outgoing(sender: &str, text: &str) -> OutgoingMessage {
        OutgoingMessage {
            local_id: LocalId::new(),
            sender: UserId::new(sender),
            body: MessageBody::text(text),
            sender_name: None,
            composed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_write_returns_existing_record() {
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();
        let msg = outgoing("alice", "coucou");

        let first = stream.write(conversation, msg.clone()).await.unwrap();
        let second = stream.write(conversation, msg).await.unwrap();

        assert_eq!(first.server_id, second.server_id);
        assert_eq!(stream.records(conversation).len(), 1);
        // Both attempts reached the backend; only the first created a record.
        assert_eq!(stream.write_calls(), 2);
    }

    #[tokio::test]
    async fn subscription_pushes_initial_and_updated_pages() {
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();

        let mut rx = stream.subscribe(conversation, 10).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Vec::<RemoteMessage>::new());

        stream.write(conversation, outgoing("alice", "un")).await.unwrap();
        let page = rx.recv().await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].body.text.as_deref(), Some("un"));
    }

    #[tokio::test]
    async fn offline_writes_are_unreachable() {
        let stream = MemoryStream::new();
        stream.set_offline(true);
        let err = stream
            .write(ConversationId::new(), outgoing("alice", "x"))
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn disconnect_write_flips_presence() {
        let ephemeral = MemoryEphemeral::new();
        let user = UserId::new("alice");

        ephemeral
            .register_disconnect_write(&user, PresenceRecord::offline_now())
            .await
            .unwrap();
        ephemeral
            .set_presence(&user, PresenceRecord::online_now())
            .await
            .unwrap();

        ephemeral.simulate_disconnect(&user);
        let record = ephemeral.presence(&user).await.unwrap().unwrap();
        assert!(!record.online);
    }
}
