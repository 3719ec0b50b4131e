//! Ingest writer for the row store
//!
//! The query engines are read-only; this is the write path ingestion and
//! tests go through. Participants are deduplicated by lower-cased address,
//! domains are derived at write time, and labels are created on first use
//! within their source.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::models::Address;

use super::schema;

/// Thread coordinates for a new message.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub source_conversation_id: String,
    pub title: Option<String>,
}

/// Raw RFC 822 bytes, optionally zlib-compressed before storage.
#[derive(Debug, Clone)]
pub struct RawBody {
    pub data: Vec<u8>,
    pub compress: bool,
}

/// Attachment metadata for a new message.
#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub content_hash: Option<String>,
}

/// Everything known about one message at ingest time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub source_id: i64,
    pub source_message_id: String,
    pub conversation: Option<NewConversation>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub size_estimate: i64,
    pub deleted_from_source_at: Option<DateTime<Utc>>,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub labels: Vec<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub raw: Option<RawBody>,
    pub attachments: Vec<NewAttachment>,
}

impl NewMessage {
    pub fn new(
        source_id: i64,
        source_message_id: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            source_message_id: source_message_id.into(),
            conversation: None,
            subject: None,
            snippet: None,
            sent_at,
            received_at: None,
            size_estimate: 0,
            deleted_from_source_at: None,
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            labels: Vec::new(),
            body_text: None,
            body_html: None,
            raw: None,
            attachments: Vec::new(),
        }
    }
}

/// Write handle over the row store.
pub struct StoreWriter {
    conn: Connection,
    fts_enabled: bool,
}

impl StoreWriter {
    /// Open (creating and migrating as needed) the database at a path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = schema::open_row_store(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory writer for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = schema::open_row_store_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        let fts_enabled = schema::search_index_exists(&conn)?;
        Ok(Self { conn, fts_enabled })
    }

    /// Hand the connection to a reader.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Create the FTS index; subsequent messages are indexed as written.
    pub fn enable_search_index(&mut self) -> Result<()> {
        schema::enable_search_index(&self.conn)?;
        self.fts_enabled = true;
        Ok(())
    }

    /// Register an account, returning its id. Idempotent per
    /// (source_type, identifier).
    pub fn add_source(
        &self,
        source_type: &str,
        identifier: &str,
        display_name: Option<&str>,
    ) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sources WHERE source_type = ? AND identifier = ?",
                params![source_type, identifier],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::backend("find source", e))?;
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn
            .execute(
                "INSERT INTO sources (source_type, identifier, display_name) VALUES (?, ?, ?)",
                params![source_type, identifier, display_name],
            )
            .map_err(|e| Error::backend("insert source", e))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Create a label with an explicit type, or return the existing one.
    pub fn add_label(&self, source_id: i64, name: &str, label_type: &str) -> Result<i64> {
        get_or_create_label(&self.conn, source_id, name, label_type)
    }

    /// Insert one message with its bodies, recipients, labels, and
    /// attachments in a single transaction. Returns the message id.
    pub fn add_message(&mut self, message: &NewMessage) -> Result<i64> {
        let fts_enabled = self.fts_enabled;
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::backend("begin ingest", e))?;

        let conversation_id = match &message.conversation {
            Some(conversation) => Some(get_or_create_conversation(
                &tx,
                message.source_id,
                conversation,
            )?),
            None => None,
        };

        let has_attachments = !message.attachments.is_empty();
        tx.execute(
            "INSERT INTO messages
             (source_id, conversation_id, source_message_id, subject, snippet,
              sent_at, received_at, size_estimate, has_attachments, attachment_count,
              deleted_from_source_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.source_id,
                conversation_id,
                message.source_message_id,
                message.subject,
                message.snippet,
                message.sent_at.to_rfc3339(),
                message.received_at.map(|t| t.to_rfc3339()),
                message.size_estimate,
                has_attachments,
                message.attachments.len() as i64,
                message.deleted_from_source_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| Error::backend("insert message", e))?;
        let message_id = tx.last_insert_rowid();

        if message.body_text.is_some() || message.body_html.is_some() {
            tx.execute(
                "INSERT INTO message_bodies (message_id, body_text, body_html) VALUES (?, ?, ?)",
                params![message_id, message.body_text, message.body_html],
            )
            .map_err(|e| Error::backend("insert body", e))?;
        }

        if let Some(raw) = &message.raw {
            let (blob, compressed) = if raw.compress {
                (compress_zlib(&raw.data)?, true)
            } else {
                (raw.data.clone(), false)
            };
            tx.execute(
                "INSERT INTO message_raw (message_id, raw, compressed) VALUES (?, ?, ?)",
                params![message_id, blob, compressed],
            )
            .map_err(|e| Error::backend("insert raw body", e))?;
        }

        if let Some(from) = &message.from {
            insert_recipient(&tx, message_id, "from", from)?;
        }
        for address in &message.to {
            insert_recipient(&tx, message_id, "to", address)?;
        }
        for address in &message.cc {
            insert_recipient(&tx, message_id, "cc", address)?;
        }
        for address in &message.bcc {
            insert_recipient(&tx, message_id, "bcc", address)?;
        }

        for label in &message.labels {
            let label_id = get_or_create_label(&tx, message.source_id, label, "user")?;
            tx.execute(
                "INSERT OR IGNORE INTO message_labels (message_id, label_id) VALUES (?, ?)",
                params![message_id, label_id],
            )
            .map_err(|e| Error::backend("insert message label", e))?;
        }

        for attachment in &message.attachments {
            tx.execute(
                "INSERT INTO attachments (message_id, filename, mime_type, size, content_hash)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    message_id,
                    attachment.filename,
                    attachment.mime_type,
                    attachment.size,
                    attachment.content_hash,
                ],
            )
            .map_err(|e| Error::backend("insert attachment", e))?;
        }

        if fts_enabled {
            index_message(&tx, message_id, message)?;
        }

        tx.commit().map_err(|e| Error::backend("commit ingest", e))?;
        Ok(message_id)
    }
}

fn compress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::backend("compress raw body", e))
}

fn get_or_create_conversation(
    conn: &Connection,
    source_id: i64,
    conversation: &NewConversation,
) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM conversations WHERE source_id = ? AND source_conversation_id = ?",
            params![source_id, conversation.source_conversation_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::backend("find conversation", e))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO conversations (source_id, source_conversation_id, title) VALUES (?, ?, ?)",
        params![
            source_id,
            conversation.source_conversation_id,
            conversation.title
        ],
    )
    .map_err(|e| Error::backend("insert conversation", e))?;
    Ok(conn.last_insert_rowid())
}

fn get_or_create_label(
    conn: &Connection,
    source_id: i64,
    name: &str,
    label_type: &str,
) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM labels WHERE source_id = ? AND name = ?",
            params![source_id, name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::backend("find label", e))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO labels (source_id, source_label_id, name, label_type) VALUES (?, ?, ?, ?)",
        params![source_id, name, name, label_type],
    )
    .map_err(|e| Error::backend("insert label", e))?;
    Ok(conn.last_insert_rowid())
}

/// Find or create the participant for an address. Addresses are matched by
/// lower-cased email; name-only addresses always get a fresh row.
fn get_or_create_participant(conn: &Connection, address: &Address) -> Result<i64> {
    let email = address.email.as_ref().map(|e| e.trim().to_lowercase());

    if let Some(email) = &email {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM participants WHERE email_address = ?",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::backend("find participant", e))?;
        if let Some(id) = existing {
            return Ok(id);
        }
    }

    let domain = email
        .as_deref()
        .and_then(|e| e.split('@').nth(1))
        .map(|d| d.to_string());
    conn.execute(
        "INSERT INTO participants (email_address, domain, display_name) VALUES (?, ?, ?)",
        params![email, domain, address.name],
    )
    .map_err(|e| Error::backend("insert participant", e))?;
    Ok(conn.last_insert_rowid())
}

fn insert_recipient(
    conn: &Connection,
    message_id: i64,
    recipient_type: &str,
    address: &Address,
) -> Result<()> {
    let participant_id = get_or_create_participant(conn, address)?;
    conn.execute(
        "INSERT INTO message_recipients (message_id, participant_id, recipient_type, display_name)
         VALUES (?, ?, ?, ?)",
        params![message_id, participant_id, recipient_type, address.name],
    )
    .map_err(|e| Error::backend("insert recipient", e))?;
    Ok(())
}

/// Write one FTS row for a message.
fn index_message(conn: &Connection, message_id: i64, message: &NewMessage) -> Result<()> {
    let join = |addresses: &[Address]| -> String {
        addresses
            .iter()
            .filter_map(|a| a.email.clone())
            .collect::<Vec<_>>()
            .join(" ")
    };
    let from_addr = message
        .from
        .as_ref()
        .and_then(|a| a.email.clone())
        .unwrap_or_default();

    conn.execute(
        "INSERT INTO messages_fts (rowid, subject, body, from_addr, to_addr, cc_addr)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            message_id,
            message.subject,
            message.body_text,
            from_addr,
            join(&message.to),
            join(&message.cc),
        ],
    )
    .map_err(|e| Error::backend("index message", e))?;
    Ok(())
}
