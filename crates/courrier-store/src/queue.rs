//! Typed CRUD for the outbound queue.
//!
//! Every mutation goes through the connection synchronously, so a process
//! restart reconstructs the exact queue state. Malformed rows are dropped
//! on read rather than propagated: a corrupt cached entry must never take
//! the send path down with it.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use courrier_shared::{ConversationId, LocalId, MessageBody};

use crate::database::Database;
use crate::error::Result;
use crate::models::QueueEntry;

impl Database {
    /// Append a new entry to the durable queue.
    pub fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO outbound_queue
                 (local_id, conversation_id, body_json, enqueued_at,
                  retries, last_attempt, last_error, failed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.local_id.to_string(),
                entry.conversation_id.to_string(),
                serde_json::to_string(&entry.body)?,
                entry.enqueued_at.to_rfc3339(),
                entry.retries,
                entry.last_attempt.map(|t| t.to_rfc3339()),
                entry.last_error,
                entry.failed as i64,
            ],
        )?;
        Ok(())
    }

    /// Remove an entry. Returns `false` when it was already gone, which is
    /// how racing retry loops discover they lost the dequeue race.
    pub fn remove_queue_entry(&self, local_id: LocalId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM outbound_queue WHERE local_id = ?1",
            params![local_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// All entries, oldest first.
    pub fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT local_id, conversation_id, body_json, enqueued_at,
                    retries, last_attempt, last_error, failed
             FROM outbound_queue
             ORDER BY enqueued_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_raw_entry)?;
        collect_valid(rows)
    }

    /// Entries for one conversation, oldest first.
    pub fn list_queue_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT local_id, conversation_id, body_json, enqueued_at,
                    retries, last_attempt, last_error, failed
             FROM outbound_queue
             WHERE conversation_id = ?1
             ORDER BY enqueued_at ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_raw_entry)?;
        collect_valid(rows)
    }

    /// Look up a single entry.
    pub fn get_queue_entry(&self, local_id: LocalId) -> Result<Option<QueueEntry>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT local_id, conversation_id, body_json, enqueued_at,
                        retries, last_attempt, last_error, failed
                 FROM outbound_queue WHERE local_id = ?1",
                params![local_id.to_string()],
                row_to_raw_entry,
            )
            .optional()?;
        Ok(raw.and_then(|r| parse_entry(r).ok()))
    }

    /// Record the outcome of a delivery attempt: bump the retry counter,
    /// stamp the attempt time, and store the error. `failed` flips the
    /// terminal flag (permanent rejection or ceiling exhausted).
    pub fn record_queue_attempt(
        &self,
        local_id: LocalId,
        attempted_at: DateTime<Utc>,
        error: Option<&str>,
        failed: bool,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE outbound_queue
             SET retries = retries + 1,
                 last_attempt = ?2,
                 last_error = ?3,
                 failed = ?4
             WHERE local_id = ?1",
            params![
                local_id.to_string(),
                attempted_at.to_rfc3339(),
                error,
                failed as i64,
            ],
        )?;
        Ok(())
    }

    /// Explicit user retry: clear the failure flag and the attempt clock so
    /// the entry is immediately eligible again with a fresh retry budget.
    pub fn reset_queue_entry(&self, local_id: LocalId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE outbound_queue
             SET retries = 0, last_attempt = NULL, last_error = NULL, failed = 0
             WHERE local_id = ?1",
            params![local_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Drop every queue entry (logout).
    pub fn clear_queue(&self) -> Result<()> {
        self.conn().execute("DELETE FROM outbound_queue", [])?;
        Ok(())
    }
}

/// Raw column values before parsing, so a bad row can be skipped.
type RawEntry = (
    String,         // local_id
    String,         // conversation_id
    String,         // body_json
    String,         // enqueued_at
    u32,            // retries
    Option<String>, // last_attempt
    Option<String>, // last_error
    i64,            // failed
);

fn row_to_raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_entry(raw: RawEntry) -> Result<QueueEntry> {
    let (local_id, conversation_id, body_json, enqueued_at, retries, last_attempt, last_error, failed) =
        raw;

    let body: MessageBody = serde_json::from_str(&body_json)?;
    let last_attempt = match last_attempt {
        Some(ts) => Some(parse_ts(&ts)?),
        None => None,
    };

    Ok(QueueEntry {
        local_id: LocalId(Uuid::parse_str(&local_id)?),
        conversation_id: ConversationId(Uuid::parse_str(&conversation_id)?),
        body,
        enqueued_at: parse_ts(&enqueued_at)?,
        retries,
        last_attempt,
        last_error,
        failed: failed != 0,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Collect parsed entries, dropping (and logging) any malformed row.
fn collect_valid(
    rows: impl Iterator<Item = rusqlite::Result<RawEntry>>,
) -> Result<Vec<QueueEntry>> {
    let mut entries = Vec::new();
    for row in rows {
        match parse_entry(row?) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed queue row");
            }
        }
    }
    Ok(entries)
}
