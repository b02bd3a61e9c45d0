//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` and `events`. All instants are
//! stored as integer epoch-milliseconds.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- hex(salt):hex(digest)
    display_name  TEXT NOT NULL,
    created_at    INTEGER NOT NULL,            -- epoch ms
    last_login    INTEGER NOT NULL,            -- epoch ms
    is_active     INTEGER NOT NULL DEFAULT 1   -- boolean 0/1
);

-- ----------------------------------------------------------------
-- Events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,            -- FK -> users(id), owner
    title         TEXT NOT NULL,
    description   TEXT,
    event_time    INTEGER NOT NULL,            -- epoch ms
    reminder_time INTEGER NOT NULL,            -- epoch ms, <= event_time
    creator       TEXT,
    reminder_sent INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at    INTEGER NOT NULL,            -- epoch ms

    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_events_event_time ON events(event_time);
CREATE INDEX IF NOT EXISTS idx_events_reminder
    ON events(reminder_sent, reminder_time);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
