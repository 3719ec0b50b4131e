//! Filter and option values accepted by the query engines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::view::{MessageSortField, SortDirection, SortField, TimeGranularity, ViewType};

/// Structured filter over messages, built from drill-down selections.
///
/// All fields are additive (AND semantics). An empty filter matches every
/// message, including messages deleted from their source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageFilter {
    /// Restrict to one account
    pub source_id: Option<i64>,
    /// Restrict to one conversation (thread)
    pub conversation_id: Option<i64>,
    /// Exact sender email address
    pub sender: Option<String>,
    /// Sender display name, falling back to the address when blank
    pub sender_name: Option<String>,
    /// Exact recipient email address (to/cc/bcc)
    pub recipient: Option<String>,
    /// Recipient display name
    pub recipient_name: Option<String>,
    /// Sender email domain
    pub domain: Option<String>,
    /// Label name, matched case-insensitively
    pub label: Option<String>,
    /// Lower bound on sent time (inclusive)
    pub after: Option<DateTime<Utc>>,
    /// Upper bound on sent time (exclusive)
    pub before: Option<DateTime<Utc>>,
    /// Time-dimension bucket key ("2024", "2024-01", or "2024-01-15");
    /// granularity is inferred from the key's length
    pub time_period: Option<String>,
    /// Only messages with attachments
    pub with_attachments_only: bool,
    /// Hide messages deleted from their source; off by default
    pub hide_deleted_from_source: bool,
    /// Dimensions whose empty bucket is being drilled into; multiple
    /// targets combine with AND
    pub match_empty: BTreeSet<ViewType>,
    /// List sort key
    pub sort_by: MessageSortField,
    /// List sort direction
    pub sort_dir: SortDirection,
    /// Maximum rows to return; 0 means the operation default
    pub limit: i64,
    /// Rows to skip
    pub offset: i64,
}

impl MessageFilter {
    /// Filter drilling into the empty bucket of one dimension.
    pub fn match_empty(view: ViewType) -> Self {
        let mut filter = Self::default();
        filter.match_empty.insert(view);
        filter
    }
}

/// Options controlling an aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateOptions {
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    /// Maximum buckets to return; 0 means 100
    pub limit: i64,
    /// Bucket width for the time dimension
    pub granularity: TimeGranularity,
    /// Raw search query merged into the aggregate's WHERE clause
    pub search_query: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            sort_by: SortField::Count,
            sort_dir: SortDirection::Desc,
            limit: 0,
            granularity: TimeGranularity::Month,
            search_query: String::new(),
        }
    }
}

/// Options for [`TotalStats`](super::TotalStats) computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsOptions {
    pub source_id: Option<i64>,
    pub with_attachments_only: bool,
    /// Raw search query restricting the counted messages
    pub search_query: String,
    /// Aggregate view the stats accompany; text terms target the view's key
    /// columns for Recipients and Labels
    pub group_by: Option<ViewType>,
}
