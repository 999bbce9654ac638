//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `outbound_queue`, `drafts`,
//! `scroll_positions`, and `app_settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Outbound queue: not-yet-confirmed messages, one row per send.
-- Rows are removed only on a confirmed remote write or an explicit
-- user discard; a process crash must reconstruct the queue exactly.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outbound_queue (
    local_id        TEXT PRIMARY KEY NOT NULL,  -- UUID v4, client-local id
    conversation_id TEXT NOT NULL,              -- UUID v4
    body_json       TEXT NOT NULL,              -- serialized MessageBody
    enqueued_at     TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    retries         INTEGER NOT NULL DEFAULT 0,
    last_attempt    TEXT                        -- NULL before first attempt
);

CREATE INDEX IF NOT EXISTS idx_queue_conversation
    ON outbound_queue(conversation_id);

-- ----------------------------------------------------------------
-- Drafts: unsent compose-box text, one row per conversation.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS drafts (
    conversation_id TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    text            TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Scroll positions: last viewport offset per conversation.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS scroll_positions (
    conversation_id TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    offset          INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- App settings: single JSON blob row (theme, notification prefs).
-- Survives logout.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS app_settings (
    id   INTEGER PRIMARY KEY CHECK (id = 1),
    json TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
