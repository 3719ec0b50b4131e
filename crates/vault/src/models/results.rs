//! Value objects returned by the query engines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bucket of an aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Dimension key (address, name, domain, label, or time bucket)
    pub key: String,
    /// Messages in the bucket
    pub count: i64,
    /// Sum of message size estimates
    pub total_size: i64,
    /// Sum of attachment sizes
    pub attachment_size: i64,
    /// Number of attachments
    pub attachment_count: i64,
    /// Total number of distinct keys before the limit was applied
    pub total_unique: i64,
}

/// An email address with optional display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: Some(email.into()),
        }
    }

    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }
}

/// Summary information for displaying a message in a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: i64,
    pub source_id: i64,
    pub conversation_id: Option<i64>,
    /// Source message id (the Gmail message id for Gmail accounts)
    pub gmail_id: String,
    /// Source conversation id of the containing thread
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub size_estimate: i64,
    pub has_attachments: bool,
    pub attachment_count: i64,
    /// Set when the message was deleted from its source; deleted messages
    /// stay visible unless the caller filters them out
    pub deleted_from_source: bool,
    /// Label names, populated by a batch fetch after the list query
    pub labels: Vec<String>,
}

/// Full message detail for the reading pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub summary: MessageSummary,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub attachments: Vec<AttachmentInfo>,
}

/// Attachment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: i64,
    pub message_id: i64,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub content_hash: Option<String>,
}

/// One account (source) with its message totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: i64,
    pub source_type: String,
    pub identifier: String,
    pub display_name: Option<String>,
    pub message_count: i64,
    pub total_size: i64,
}

/// Corpus-wide totals, optionally restricted by [`StatsOptions`](super::StatsOptions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalStats {
    pub message_count: i64,
    pub total_size: i64,
    pub attachment_count: i64,
    pub attachment_size: i64,
}

/// Combined result of a search with best-effort count and stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub messages: Vec<MessageSummary>,
    /// Total matching messages; -1 when the count query failed
    pub total_count: i64,
    /// Aggregate over the matching messages; `None` when not requested or
    /// when the stats query failed
    pub stats: Option<Vec<AggregateRow>>,
}
