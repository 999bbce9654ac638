//! Merge of the live remote page with still-pending queue entries.
//!
//! The merge is a pure function of the latest known state: invoked on
//! every remote push and every outbox change, in any interleaving, it
//! yields the same ordered, deduplicated view. Pending entries whose
//! client-local id already appears on a remote record are dropped -- that
//! is the promotion mechanism for optimistic rows.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use courrier_shared::{DeliveryStatus, LocalId, MessageBody, UserId};
use courrier_store::QueueEntry;

use crate::remote::RemoteMessage;

/// A message either confirmed remotely or still pending locally.
#[derive(Debug, Clone)]
pub enum MergeInput {
    Confirmed(RemoteMessage),
    Pending(QueueEntry),
}

/// One row of the rendered conversation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Server id once confirmed, client-local id otherwise.
    pub id: String,
    /// Always present; correlates optimistic and confirmed copies.
    pub local_id: LocalId,
    pub sender: UserId,
    pub body: MessageBody,
    /// Server timestamp when confirmed, enqueue timestamp otherwise.
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub is_optimistic: bool,
    /// Sender display name (group conversations only).
    pub sender_name: Option<String>,
    /// Last delivery error, surfaced for failed/retrying entries.
    pub error: Option<String>,
}

impl MessageView {
    fn confirmed(message: &RemoteMessage) -> Self {
        Self {
            id: message.server_id.to_string(),
            local_id: message.local_id,
            sender: message.sender.clone(),
            body: message.body.clone(),
            timestamp: message.timestamp,
            status: message.status,
            is_optimistic: false,
            sender_name: message.sender_name.clone(),
            error: None,
        }
    }

    fn pending(entry: &QueueEntry, me: &UserId) -> Self {
        Self {
            id: entry.local_id.to_string(),
            local_id: entry.local_id,
            sender: me.clone(),
            body: entry.body.clone(),
            timestamp: entry.enqueued_at,
            status: if entry.failed {
                DeliveryStatus::Failed
            } else {
                DeliveryStatus::Sending
            },
            is_optimistic: true,
            sender_name: None,
            error: entry.last_error.clone(),
        }
    }

    fn from_input(input: &MergeInput, me: &UserId) -> Self {
        match input {
            MergeInput::Confirmed(message) => Self::confirmed(message),
            MergeInput::Pending(entry) => Self::pending(entry, me),
        }
    }
}

/// Merge the latest remote page with the pending queue entries for one
/// conversation into a single ordered view.
///
/// The page is already time-ordered by the remote store; pending entries
/// are appended when their local id is absent from it, then the whole list
/// is stable-sorted by best timestamp. Equal timestamps keep insertion
/// order (remote page first, queue order after), so repeated merges of the
/// same inputs are referentially stable.
pub fn merge_view(me: &UserId, page: &[RemoteMessage], pending: &[QueueEntry]) -> Vec<MessageView> {
    let confirmed_ids: HashSet<LocalId> = page.iter().map(|m| m.local_id).collect();

    let mut inputs: Vec<MergeInput> = page
        .iter()
        .cloned()
        .map(MergeInput::Confirmed)
        .collect();
    inputs.extend(
        pending
            .iter()
            .filter(|entry| !confirmed_ids.contains(&entry.local_id))
            .cloned()
            .map(MergeInput::Pending),
    );

    let mut views: Vec<MessageView> = inputs
        .iter()
        .map(|input| MessageView::from_input(input, me))
        .collect();
    views.sort_by_key(|view| view.timestamp);
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courrier_shared::ConversationId;
    use uuid::Uuid;

    fn remote(
        conversation: ConversationId,
        local_id: LocalId,
        text: &str,
        at: DateTime<Utc>,
    ) -> RemoteMessage {
        RemoteMessage {
            server_id: Uuid::new_v4(),
            conversation_id: conversation,
            sender: UserId::new("alice"),
            body: MessageBody::text(text),
            timestamp: at,
            status: DeliveryStatus::Sent,
            local_id,
            sender_name: None,
        }
    }

    fn queued(conversation: ConversationId, text: &str, at: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            enqueued_at: at,
            ..QueueEntry::new(conversation, MessageBody::text(text))
        }
    }

    #[test]
    fn pending_entries_append_after_remote_page() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();
        let t0 = Utc::now();

        let page = vec![remote(conversation, LocalId::new(), "confirmé", t0)];
        let pending = vec![queued(conversation, "en vol", t0 + Duration::seconds(1))];

        let view = merge_view(&me, &page, &pending);
        assert_eq!(view.len(), 2);
        assert!(!view[0].is_optimistic);
        assert!(view[1].is_optimistic);
        assert_eq!(view[1].status, DeliveryStatus::Sending);
        assert_eq!(view[1].sender, me);
    }

    #[test]
    fn confirmed_copy_hides_the_optimistic_one() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();
        let t0 = Utc::now();

        let entry = queued(conversation, "promu", t0);
        // The remote record carries the same client-local id.
        let page = vec![remote(conversation, entry.local_id, "promu", t0 + Duration::seconds(2))];

        let view = merge_view(&me, &page, &[entry.clone()]);
        assert_eq!(view.len(), 1);
        assert!(!view[0].is_optimistic);
        assert_eq!(view[0].local_id, entry.local_id);
    }

    #[test]
    fn at_most_one_row_per_local_id() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();
        let t0 = Utc::now();

        let mut pending = Vec::new();
        let mut page = Vec::new();
        for i in 0..5 {
            let entry = queued(conversation, "m", t0 + Duration::seconds(i));
            page.push(remote(conversation, entry.local_id, "m", t0 + Duration::seconds(i)));
            pending.push(entry);
        }

        let view = merge_view(&me, &page, &pending);
        let ids: HashSet<LocalId> = view.iter().map(|v| v.local_id).collect();
        assert_eq!(view.len(), 5);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn merge_is_idempotent() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();
        let t0 = Utc::now();

        let page = vec![
            remote(conversation, LocalId::new(), "a", t0),
            remote(conversation, LocalId::new(), "b", t0 + Duration::seconds(1)),
        ];
        let pending = vec![queued(conversation, "c", t0 + Duration::seconds(1))];

        let first = merge_view(&me, &page, &pending);
        let second = merge_view(&me, &page, &pending);
        assert_eq!(first, second);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();
        let t0 = Utc::now();

        // Remote record and pending entry share the exact timestamp; the
        // remote one was inserted first and must stay first.
        let page = vec![remote(conversation, LocalId::new(), "remote", t0)];
        let pending = vec![queued(conversation, "local", t0)];

        let view = merge_view(&me, &page, &pending);
        assert_eq!(view[0].body.text.as_deref(), Some("remote"));
        assert_eq!(view[1].body.text.as_deref(), Some("local"));
    }

    #[test]
    fn failed_entries_surface_status_and_error() {
        let me = UserId::new("bob");
        let conversation = ConversationId::new();

        let mut entry = queued(conversation, "raté", Utc::now());
        entry.failed = true;
        entry.last_error = Some("conversation deleted".into());

        let view = merge_view(&me, &[], &[entry]);
        assert_eq!(view[0].status, DeliveryStatus::Failed);
        assert_eq!(view[0].error.as_deref(), Some("conversation deleted"));
    }
}
