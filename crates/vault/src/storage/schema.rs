//! Row-store schema and connection setup

use std::path::Path;

use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

use crate::error::{Error, Result};

/// Schema migrations, applied in order on open; SQLite's user_version
/// pragma records how far a database has advanced.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Accounts
            CREATE TABLE sources (
                id INTEGER PRIMARY KEY,
                source_type TEXT NOT NULL,
                identifier TEXT NOT NULL,
                display_name TEXT,
                UNIQUE (source_type, identifier)
            );

            -- Email addresses; lower-cased at ingest
            CREATE TABLE participants (
                id INTEGER PRIMARY KEY,
                email_address TEXT,
                domain TEXT,
                display_name TEXT
            );

            CREATE UNIQUE INDEX idx_participants_email
                ON participants(email_address);

            -- Threads
            CREATE TABLE conversations (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                source_conversation_id TEXT NOT NULL,
                title TEXT,
                UNIQUE (source_id, source_conversation_id)
            );

            CREATE TABLE messages (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                conversation_id INTEGER REFERENCES conversations(id),
                source_message_id TEXT NOT NULL,
                subject TEXT,
                snippet TEXT,
                sent_at TEXT NOT NULL,
                received_at TEXT,
                size_estimate INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                attachment_count INTEGER NOT NULL DEFAULT 0,
                deleted_from_source_at TEXT,
                UNIQUE (source_id, source_message_id)
            );

            CREATE INDEX idx_messages_sent_at ON messages(sent_at DESC);
            CREATE INDEX idx_messages_conversation ON messages(conversation_id);

            CREATE TABLE message_bodies (
                message_id INTEGER PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
                body_text TEXT,
                body_html TEXT
            );

            -- Raw RFC 822 bytes, zlib-compressed when compressed = 1
            CREATE TABLE message_raw (
                message_id INTEGER PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
                raw BLOB NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE message_recipients (
                id INTEGER PRIMARY KEY,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                participant_id INTEGER REFERENCES participants(id),
                recipient_type TEXT NOT NULL,
                display_name TEXT
            );

            CREATE INDEX idx_recipients_message ON message_recipients(message_id);
            CREATE INDEX idx_recipients_participant
                ON message_recipients(participant_id, recipient_type);

            CREATE TABLE labels (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                source_label_id TEXT NOT NULL,
                name TEXT NOT NULL,
                label_type TEXT NOT NULL DEFAULT 'user',
                UNIQUE (source_id, name)
            );

            CREATE TABLE message_labels (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                PRIMARY KEY (message_id, label_id)
            );

            CREATE INDEX idx_message_labels_label ON message_labels(label_id);

            CREATE TABLE attachments (
                id INTEGER PRIMARY KEY,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                filename TEXT,
                mime_type TEXT,
                size INTEGER,
                content_hash TEXT
            );

            CREATE INDEX idx_attachments_message ON attachments(message_id);
            "#,
        ),
    ])
}

/// SQLite pragmas tuned for a read-mostly archive: WAL for concurrent
/// readers, relaxed sync, a 64MB page cache, in-memory temp storage,
/// mmapped reads, and enforced foreign keys.
const PRAGMAS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -64000;
    PRAGMA temp_store = MEMORY;
    PRAGMA mmap_size = 268435456;
    PRAGMA foreign_keys = ON;
"#;

/// Open (and migrate) the row-store database at a path.
pub fn open_row_store(db_path: impl AsRef<Path>) -> Result<Connection> {
    let mut conn = Connection::open(db_path.as_ref())
        .map_err(|e| Error::backend("open row store", e))?;
    configure(&mut conn)?;
    Ok(conn)
}

/// In-memory row store for tests and scratch work.
pub fn open_row_store_in_memory() -> Result<Connection> {
    let mut conn =
        Connection::open_in_memory().map_err(|e| Error::backend("open row store", e))?;
    configure(&mut conn)?;
    Ok(conn)
}

fn configure(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)
        .map_err(|e| Error::backend("configure row store", e))?;
    migrations()
        .to_latest(conn)
        .map_err(|e| Error::backend("migrate row store", e))?;
    Ok(())
}

/// Create the optional FTS5 index over message text.
///
/// The table is contentless; ingestion writes one row per message with
/// rowid = messages.id. Engines that find the table absent fall back to
/// LIKE matching.
pub fn enable_search_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            subject, body, from_addr, to_addr, cc_addr,
            content='', tokenize='unicode61'
        );",
    )
    .map_err(|e| Error::backend("create search index", e))
}

/// Check whether the FTS table exists.
pub fn search_index_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'messages_fts'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::backend("probe search index", e))?;
    Ok(count >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_validate() {
        migrations().validate().unwrap();
    }

    #[test]
    fn test_open_in_memory_creates_schema() {
        let conn = open_row_store_in_memory().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('sources', 'participants', 'conversations', 'messages', 'message_bodies',
                  'message_raw', 'message_recipients', 'labels', 'message_labels', 'attachments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);
    }

    #[test]
    fn test_search_index_is_optional() {
        let conn = open_row_store_in_memory().unwrap();
        assert!(!search_index_exists(&conn).unwrap());
        enable_search_index(&conn).unwrap();
        assert!(search_index_exists(&conn).unwrap());
    }
}
