//! Application-wide client handle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::info;

use courrier_shared::constants::DEFAULT_PAGE_LIMIT;
use courrier_shared::{ConversationId, LocalId, MessageBody, UserId};
use courrier_store::{AppSettings, Database, StoreError};
use courrier_sync::outbox::spawn_outbox;
use courrier_sync::presence::spawn_presence;
use courrier_sync::{
    retry, EphemeralSync, MessageStream, Outbox, PresenceHandle, SenderProfile,
};

use crate::conversation::Conversation;
use crate::error::Result;

/// Startup configuration for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The signed-in user (uid from the hosted auth layer).
    pub user: UserId,
    /// Display name attached to messages in group conversations.
    pub display_name: Option<String>,
    /// Explicit database path; `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Page size requested from the remote subscription.
    pub page_limit: usize,
}

impl ClientConfig {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            display_name: None,
            db_path: None,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Central handle owning the engine's process-lifetime pieces.
///
/// Created once at application launch. The global retry processor it
/// spawns keeps running while the client is alive, so messages queued
/// with every conversation screen closed are still delivered.
pub struct ChatClient {
    user: UserId,
    db: Arc<Mutex<Database>>,
    outbox: Outbox,
    stream: Arc<dyn MessageStream>,
    ephemeral: Arc<dyn EphemeralSync>,
    presence: PresenceHandle,
    sender: SenderProfile,
    page_limit: usize,
    retry_shutdown: mpsc::Sender<()>,
}

impl ChatClient {
    /// Open the local store (running any pending migrations), spawn the
    /// outbox actor, the global retry processor, and the presence
    /// coordinator. Must be called from within a tokio runtime.
    pub fn open(
        config: ClientConfig,
        stream: Arc<dyn MessageStream>,
        ephemeral: Arc<dyn EphemeralSync>,
    ) -> Result<Self> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        let db = Arc::new(Mutex::new(db));

        let outbox = spawn_outbox(db.clone());
        let sender = SenderProfile {
            user: config.user.clone(),
            display_name: config.display_name.clone(),
        };

        let (retry_shutdown, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(retry::start_retry_loop(
            outbox.clone(),
            stream.clone(),
            sender.clone(),
            shutdown_rx,
        ));

        let presence = spawn_presence(config.user.clone(), ephemeral.clone());

        info!(user = %config.user, "chat client started");

        Ok(Self {
            user: config.user,
            db,
            outbox,
            stream,
            ephemeral,
            presence,
            sender,
            page_limit: config.page_limit,
            retry_shutdown,
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Send a message: durable enqueue (instant, the optimistic row is
    /// visible as soon as open screens re-merge) plus a background
    /// first-chance delivery attempt. Only the enqueue itself can fail
    /// here; delivery failures surface on the merged view.
    pub async fn send(&self, conversation: ConversationId, body: MessageBody) -> Result<LocalId> {
        let local_id =
            send_message(&self.outbox, &self.stream, &self.sender, conversation, body).await?;
        // A sent message supersedes whatever draft was being composed.
        let _ = self.with_db(|db| db.set_draft(conversation, ""));
        Ok(local_id)
    }

    /// Open a live handle on one conversation.
    pub async fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        Conversation::open(
            id,
            self.user.clone(),
            self.db.clone(),
            self.outbox.clone(),
            self.stream.clone(),
            self.ephemeral.clone(),
            self.sender.clone(),
            self.page_limit,
        )
        .await
    }

    /// Explicit user retry of a failed message: reset its backoff state
    /// and sweep immediately instead of waiting for the next window.
    pub async fn retry_failed(&self, local_id: LocalId) -> bool {
        if !self.outbox.retry_now(local_id).await {
            return false;
        }
        let outbox = self.outbox.clone();
        let stream = self.stream.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            retry::flush_eligible(&outbox, stream.as_ref(), &sender).await;
        });
        true
    }

    /// Explicit user discard of a failed message.
    pub async fn discard_failed(&self, local_id: LocalId) -> bool {
        self.outbox.discard(local_id).await
    }

    /// Attempt every eligible queue entry right now. The screen-scoped
    /// complement of the global sweep; racing the two is harmless.
    pub async fn flush_outbox(&self) {
        retry::flush_eligible(&self.outbox, self.stream.as_ref(), &self.sender).await;
    }

    /// Presence controls (touch / foreground / background).
    pub fn presence(&self) -> &PresenceHandle {
        &self.presence
    }

    /// Whether a peer currently renders as online, applying the reader's
    /// staleness threshold to their heartbeat.
    pub async fn peer_online(&self, user: &UserId) -> Result<bool> {
        let record = self.ephemeral.presence(user).await?;
        Ok(record.is_some_and(|r| r.is_online(chrono::Utc::now())))
    }

    pub fn set_draft(&self, conversation: ConversationId, text: &str) -> Result<()> {
        self.with_db(|db| db.set_draft(conversation, text))
    }

    pub fn draft(&self, conversation: ConversationId) -> Result<Option<String>> {
        self.with_db(|db| db.draft(conversation))
    }

    pub fn save_scroll(&self, conversation: ConversationId, offset: i64) -> Result<()> {
        self.with_db(|db| db.save_scroll(conversation, offset))
    }

    pub fn scroll(&self, conversation: ConversationId) -> Result<Option<i64>> {
        self.with_db(|db| db.scroll(conversation))
    }

    pub fn settings(&self) -> Result<AppSettings> {
        self.with_db(|db| db.settings())
    }

    pub fn update_settings(&self, settings: &AppSettings) -> Result<()> {
        self.with_db(|db| db.update_settings(settings))
    }

    /// Sign out: write a final offline presence record and clear all
    /// session-scoped local state. Preferences (theme) survive.
    pub async fn logout(&self) -> Result<()> {
        self.presence.shutdown().await;
        self.with_db(|db| db.clear_session())?;
        info!(user = %self.user, "logged out");
        Ok(())
    }

    /// Stop the process-lifetime tasks (retry loop, presence).
    pub async fn shutdown(&self) {
        let _ = self.retry_shutdown.send(()).await;
        self.presence.shutdown().await;
        info!("chat client stopped");
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let db = self.db.lock().expect("store lock");
        Ok(f(&db)?)
    }
}

/// Shared send path: durable enqueue, then a background first-chance
/// delivery attempt racing the global retry processor.
pub(crate) async fn send_message(
    outbox: &Outbox,
    stream: &Arc<dyn MessageStream>,
    sender: &SenderProfile,
    conversation: ConversationId,
    body: MessageBody,
) -> Result<LocalId> {
    let entry = outbox.enqueue(conversation, body).await?;
    let local_id = entry.local_id;

    let outbox = outbox.clone();
    let stream = stream.clone();
    let sender = sender.clone();
    tokio::spawn(async move {
        retry::flush_entry(&outbox, stream.as_ref(), &sender, &entry).await;
    });

    Ok(local_id)
}
