//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `messages` and `groups`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    uuid        TEXT PRIMARY KEY NOT NULL,  -- M-prefixed message id
    session_id  TEXT NOT NULL,              -- S-prefixed session id
    type        INTEGER NOT NULL,           -- 0 text, 2 file, 3 audio/video
    content     TEXT NOT NULL DEFAULT '',
    url         TEXT NOT NULL DEFAULT '',
    send_id     TEXT NOT NULL,              -- U-prefixed sender id
    send_name   TEXT NOT NULL DEFAULT '',
    send_avatar TEXT NOT NULL DEFAULT '',   -- begins with /static/ or empty
    receive_id  TEXT NOT NULL,              -- U-prefixed user or G-prefixed group
    file_size   TEXT NOT NULL DEFAULT '',
    file_type   TEXT NOT NULL DEFAULT '',
    file_name   TEXT NOT NULL DEFAULT '',
    status      INTEGER NOT NULL DEFAULT 0, -- 0 unsent, 1 sent
    created_at  TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    av_data     TEXT NOT NULL DEFAULT ''    -- raw signalling blob
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(send_id, receive_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_receive
    ON messages(receive_id, created_at);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    uuid       TEXT PRIMARY KEY NOT NULL,   -- G-prefixed group id
    name       TEXT NOT NULL,
    members    TEXT NOT NULL DEFAULT '[]',  -- JSON array of U-prefixed ids
    created_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
