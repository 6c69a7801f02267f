//! v001 -- Initial schema creation.
//!
//! Creates the three document tables: `profiles`, `messages` and `threads`.
//! Bodies are stored as JSON text exactly as the remote store would hold
//! them; only the columns needed for keying and ordering are lifted out.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Directory (one document per participant)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    doc_id TEXT PRIMARY KEY NOT NULL,
    body   TEXT NOT NULL                      -- JSON object
);

-- ----------------------------------------------------------------
-- Message logs (append-only, partitioned by conversation key)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,  -- store document order
    id               TEXT NOT NULL UNIQUE,               -- UUID v4
    conversation_key TEXT NOT NULL,
    timestamp        TEXT,                               -- RFC-3339, NULL while unresolved
    body             TEXT NOT NULL                       -- JSON object
);

CREATE INDEX IF NOT EXISTS idx_messages_key_ts
    ON messages(conversation_key, timestamp, seq);

-- ----------------------------------------------------------------
-- Thread summaries (cache for listing conversations)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    conversation_key TEXT PRIMARY KEY NOT NULL,
    body             TEXT NOT NULL                       -- JSON object
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
