//! Delivered/read acknowledgements.
//!
//! Both transitions are batched by conversation-open rather than
//! per-message: when a participant views a conversation, one remote
//! operation advances every other-sender message at once, keeping the
//! signal O(1) in the number of unread messages. "Delivered" therefore
//! means recipient-opened-conversation, not network receipt; that weaker
//! semantic is part of the wire contract and deliberately preserved.
//! Status is only ever rendered on the sender's own messages.

use tracing::debug;

use courrier_shared::{ConversationId, DeliveryStatus, RemoteError, UserId};

use crate::remote::{MessageStream, StatusFilter};

/// The viewer opened the conversation: flip every other-sender `Sent`
/// message to `Delivered` in one batched call.
pub async fn acknowledge_delivered(
    stream: &dyn MessageStream,
    conversation: ConversationId,
    viewer: &UserId,
) -> Result<usize, RemoteError> {
    let updated = stream
        .update_status(
            conversation,
            StatusFilter {
                sender_not: viewer.clone(),
                current: vec![DeliveryStatus::Sent],
            },
            DeliveryStatus::Delivered,
        )
        .await?;
    debug!(conversation = %conversation, updated, "delivered acknowledged");
    Ok(updated)
}

/// The viewer kept the conversation visible past the dwell time: flip
/// every other-sender `Sent`/`Delivered` message to `Read`, again in one
/// batched call.
pub async fn acknowledge_read(
    stream: &dyn MessageStream,
    conversation: ConversationId,
    viewer: &UserId,
) -> Result<usize, RemoteError> {
    let updated = stream
        .update_status(
            conversation,
            StatusFilter {
                sender_not: viewer.clone(),
                current: vec![DeliveryStatus::Sent, DeliveryStatus::Delivered],
            },
            DeliveryStatus::Read,
        )
        .await?;
    debug!(conversation = %conversation, updated, "read acknowledged");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStream;
    use crate::remote::OutgoingMessage;
    use chrono::Utc;
    use courrier_shared::{LocalId, MessageBody};

    async fn seed(stream: &MemoryStream, conversation: ConversationId, sender: &str, n: usize) {
        for i in 0..n {
            stream
                .write(
                    conversation,
                    OutgoingMessage {
                        local_id: LocalId::new(),
                        sender: UserId::new(sender),
                        body: MessageBody::text(format!("m{i}")),
                        sender_name: None,
                        composed_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn one_batch_call_delivers_everything() {
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();
        seed(&stream, conversation, "alice", 5).await;

        let viewer = UserId::new("bob");
        let updated = acknowledge_delivered(&stream, conversation, &viewer)
            .await
            .unwrap();

        assert_eq!(updated, 5);
        assert_eq!(stream.batch_calls(), 1);
        assert!(stream
            .records(conversation)
            .iter()
            .all(|m| m.status == DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn own_messages_are_left_alone() {
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();
        seed(&stream, conversation, "alice", 2).await;
        seed(&stream, conversation, "bob", 3).await;

        let viewer = UserId::new("bob");
        let updated = acknowledge_delivered(&stream, conversation, &viewer)
            .await
            .unwrap();

        // Only alice's messages advance; bob never acknowledges his own.
        assert_eq!(updated, 2);
    }

    #[tokio::test]
    async fn read_does_not_regress_to_delivered() {
        let stream = MemoryStream::new();
        let conversation = ConversationId::new();
        seed(&stream, conversation, "alice", 3).await;
        let viewer = UserId::new("bob");

        acknowledge_read(&stream, conversation, &viewer).await.unwrap();
        // A later delivered sweep must not demote read messages.
        let updated = acknowledge_delivered(&stream, conversation, &viewer)
            .await
            .unwrap();

        assert_eq!(updated, 0);
        assert!(stream
            .records(conversation)
            .iter()
            .all(|m| m.status == DeliveryStatus::Read));
    }
}
