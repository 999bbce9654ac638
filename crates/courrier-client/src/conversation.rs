//! Live handle on one open conversation.
//!
//! Owns the merge task joining the remote subscription with outbox
//! changes, the typing writer, and the read-dwell timer. Dropping the
//! handle cancels all of those; it never cancels in-flight retries, which
//! belong to the process-lifetime global retry processor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courrier_shared::constants::READ_DWELL_MS;
use courrier_shared::{ConversationId, LocalId, MessageBody, UserId};
use courrier_store::Database;
use courrier_sync::merge::merge_view;
use courrier_sync::remote::Page;
use courrier_sync::typing::spawn_typing;
use courrier_sync::{
    delivery, EphemeralSync, MessageStream, MessageView, Outbox, SenderProfile, TypingPublisher,
};

use crate::client::send_message;
use crate::error::Result;

/// Handle for a conversation screen.
pub struct Conversation {
    id: ConversationId,
    viewer: UserId,
    db: Arc<Mutex<Database>>,
    outbox: Outbox,
    stream: Arc<dyn MessageStream>,
    ephemeral: Arc<dyn EphemeralSync>,
    sender: SenderProfile,
    typing: TypingPublisher,
    view_rx: watch::Receiver<Vec<MessageView>>,
    merge_task: JoinHandle<()>,
    dwell_task: Mutex<Option<JoinHandle<()>>>,
}

impl Conversation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn open(
        id: ConversationId,
        viewer: UserId,
        db: Arc<Mutex<Database>>,
        outbox: Outbox,
        stream: Arc<dyn MessageStream>,
        ephemeral: Arc<dyn EphemeralSync>,
        sender: SenderProfile,
        page_limit: usize,
    ) -> Result<Self> {
        let page_rx = stream.subscribe(id, page_limit).await?;
        let changes = outbox.subscribe_changes();

        // Seed the view with pending entries so an offline conversation
        // renders its optimistic rows before the first remote push.
        let initial = merge_view(&viewer, &[], &outbox.snapshot(id).await);
        let (view_tx, view_rx) = watch::channel(initial);

        let merge_task = tokio::spawn(merge_loop(
            id,
            viewer.clone(),
            outbox.clone(),
            page_rx,
            changes,
            view_tx,
        ));

        let typing = spawn_typing(id, viewer.clone(), ephemeral.clone());

        debug!(conversation = %id, "conversation opened");

        Ok(Self {
            id,
            viewer,
            db,
            outbox,
            stream,
            ephemeral,
            sender,
            typing,
            view_rx,
            merge_task,
            dwell_task: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Current merged view: ordered, deduplicated, optimistic rows flagged.
    pub fn view(&self) -> Vec<MessageView> {
        self.view_rx.borrow().clone()
    }

    /// Watch the merged view for changes.
    pub fn watch(&self) -> watch::Receiver<Vec<MessageView>> {
        self.view_rx.clone()
    }

    /// Send a message in this conversation. Clears the typing signal and
    /// the draft.
    pub async fn send(&self, body: MessageBody) -> Result<LocalId> {
        self.typing.sent();
        let local_id =
            send_message(&self.outbox, &self.stream, &self.sender, self.id, body).await?;
        if let Ok(db) = self.db.lock() {
            let _ = db.set_draft(self.id, "");
        }
        Ok(local_id)
    }

    /// Forward a compose-box keystroke to the debounced typing writer.
    pub fn keystroke(&self) {
        self.typing.keystroke();
    }

    /// Whether a peer currently shows as typing, applying the reader-side
    /// TTL: a stale `true` (writer crashed before clearing it) is
    /// suppressed.
    pub async fn peer_typing(&self, user: &UserId) -> Result<bool> {
        let record = self.ephemeral.typing(self.id, user).await?;
        Ok(record.is_some_and(|r| r.is_active(chrono::Utc::now())))
    }

    /// The conversation became visible: immediately acknowledge delivery
    /// of every other-sender `Sent` message in one batched call, and arm
    /// the read-dwell timer. A previous timer still pending is cancelled
    /// and re-armed.
    pub async fn mark_viewed(&self) -> Result<()> {
        delivery::acknowledge_delivered(self.stream.as_ref(), self.id, &self.viewer).await?;

        let stream = self.stream.clone();
        let id = self.id;
        let viewer = self.viewer.clone();
        let dwell = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(READ_DWELL_MS)).await;
            if let Err(e) = delivery::acknowledge_read(stream.as_ref(), id, &viewer).await {
                warn!(conversation = %id, error = %e, "read acknowledgement failed");
            }
        });

        let mut slot = self.dwell_task.lock().expect("dwell lock");
        if let Some(previous) = slot.replace(dwell) {
            previous.abort();
        }
        Ok(())
    }

    /// The conversation scrolled away before the dwell elapsed: cancel
    /// the pending read acknowledgement.
    pub fn cancel_dwell(&self) {
        if let Some(task) = self.dwell_task.lock().expect("dwell lock").take() {
            task.abort();
        }
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.merge_task.abort();
        if let Ok(mut slot) = self.dwell_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        debug!(conversation = %self.id, "conversation closed");
    }
}

/// Re-merge on every remote page push and every outbox change touching
/// this conversation. The merge is a pure function of the latest known
/// state, so event interleaving cannot corrupt the rendered order.
async fn merge_loop(
    id: ConversationId,
    viewer: UserId,
    outbox: Outbox,
    mut page_rx: mpsc::Receiver<Page>,
    mut changes: broadcast::Receiver<ConversationId>,
    view_tx: watch::Sender<Vec<MessageView>>,
) {
    let mut page: Page = Vec::new();

    loop {
        tokio::select! {
            maybe_page = page_rx.recv() => {
                match maybe_page {
                    Some(new_page) => page = new_page,
                    None => break, // subscription ended
                }
            }
            change = changes.recv() => {
                match change {
                    Ok(conversation) if conversation == id => {}
                    Ok(_) => continue, // another conversation's change
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(conversation = %id, skipped, "outbox changes lagged, re-merging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }

        let pending = outbox.snapshot(id).await;
        if view_tx.send(merge_view(&viewer, &page, &pending)).is_err() {
            break; // every handle dropped
        }
    }

    debug!(conversation = %id, "merge loop ended");
}
