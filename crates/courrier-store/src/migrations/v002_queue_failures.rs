//! v002 -- Track failure detail on queue entries.
//!
//! Entries that exhaust the retry ceiling are retained (never silently
//! dropped), so the queue needs a terminal-failure flag and the last error
//! string to surface on the merged view.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE outbound_queue ADD COLUMN last_error TEXT;
ALTER TABLE outbound_queue ADD COLUMN failed INTEGER NOT NULL DEFAULT 0;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
