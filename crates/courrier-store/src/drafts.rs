//! Per-conversation compose-box drafts.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use courrier_shared::ConversationId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Save the draft for a conversation. An empty draft deletes the row.
    pub fn set_draft(&self, conversation_id: ConversationId, text: &str) -> Result<()> {
        if text.is_empty() {
            self.conn().execute(
                "DELETE FROM drafts WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
            )?;
            return Ok(());
        }

        self.conn().execute(
            "INSERT INTO drafts (conversation_id, text, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id) DO UPDATE
                 SET text = excluded.text, updated_at = excluded.updated_at",
            params![
                conversation_id.to_string(),
                text,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn draft(&self, conversation_id: ConversationId) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT text FROM drafts WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Drop every draft (logout).
    pub fn clear_drafts(&self) -> Result<()> {
        self.conn().execute("DELETE FROM drafts", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_round_trip_and_empty_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let conversation = ConversationId::new();

        assert_eq!(db.draft(conversation).unwrap(), None);

        db.set_draft(conversation, "à bient").unwrap();
        db.set_draft(conversation, "à bientôt").unwrap();
        assert_eq!(db.draft(conversation).unwrap().as_deref(), Some("à bientôt"));

        db.set_draft(conversation, "").unwrap();
        assert_eq!(db.draft(conversation).unwrap(), None);
    }
}
