//! Session-scoped state (scroll offsets, logout) and the app settings blob.
//!
//! Settings are a single JSON row so new preference fields never need a
//! schema migration. Logout clears everything tied to the signed-in
//! session -- drafts, the outbound queue, scroll offsets -- but leaves the
//! settings row untouched so a theme choice survives re-login.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use courrier_shared::ConversationId;

use crate::database::Database;
use crate::error::Result;

/// User preferences persisted across sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub theme: String,
    pub notifications_enabled: bool,
    pub enter_sends: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "dark".into(),
            notifications_enabled: true,
            enter_sends: true,
        }
    }
}

impl Database {
    /// Persist the last viewport offset for a conversation.
    pub fn save_scroll(&self, conversation_id: ConversationId, offset: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO scroll_positions (conversation_id, offset)
             VALUES (?1, ?2)
             ON CONFLICT(conversation_id) DO UPDATE SET offset = excluded.offset",
            params![conversation_id.to_string(), offset],
        )?;
        Ok(())
    }

    pub fn scroll(&self, conversation_id: ConversationId) -> Result<Option<i64>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT offset FROM scroll_positions WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Load settings, falling back to defaults when the row is missing or
    /// its JSON no longer parses.
    pub fn settings(&self) -> Result<AppSettings> {
        let json: Option<String> = self
            .conn()
            .query_row("SELECT json FROM app_settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(match json {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "corrupt settings blob, using defaults");
                AppSettings::default()
            }),
            None => AppSettings::default(),
        })
    }

    pub fn update_settings(&self, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn().execute(
            "INSERT INTO app_settings (id, json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![json],
        )?;
        Ok(())
    }

    /// Clear everything scoped to the signed-in session. Settings survive.
    pub fn clear_session(&self) -> Result<()> {
        self.clear_queue()?;
        self.clear_drafts()?;
        self.conn().execute("DELETE FROM scroll_positions", [])?;
        tracing::info!("session state cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueueEntry;
    use courrier_shared::MessageBody;

    #[test]
    fn settings_round_trip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        assert_eq!(db.settings().unwrap(), AppSettings::default());

        let mut settings = AppSettings::default();
        settings.theme = "light".into();
        db.update_settings(&settings).unwrap();
        assert_eq!(db.settings().unwrap(), settings);
    }

    #[test]
    fn logout_clears_session_but_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let conversation = ConversationId::new();

        db.set_draft(conversation, "brouillon").unwrap();
        db.save_scroll(conversation, 420).unwrap();
        db.insert_queue_entry(&QueueEntry::new(conversation, MessageBody::text("en attente")))
            .unwrap();
        let mut settings = AppSettings::default();
        settings.theme = "light".into();
        db.update_settings(&settings).unwrap();

        db.clear_session().unwrap();

        assert_eq!(db.draft(conversation).unwrap(), None);
        assert_eq!(db.scroll(conversation).unwrap(), None);
        assert!(db.list_queue().unwrap().is_empty());
        assert_eq!(db.settings().unwrap().theme, "light");
    }
}
