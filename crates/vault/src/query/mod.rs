//! Query API shared by the row-store and columnar engines
//!
//! [`QueryEngine`] has one method per public operation; the SQL-building
//! pieces live in the submodules and are shared by both implementations.

pub(crate) mod builders;
pub mod dialect;
pub mod dimensions;
pub mod filter_sql;

pub use builders::{DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};
pub use dimensions::DEFAULT_AGGREGATE_LIMIT;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::models::{
    AccountInfo, AggregateOptions, AggregateRow, AttachmentInfo, MessageDetail, MessageFilter,
    MessageSummary, SearchResults, StatsOptions, TotalStats, ViewType,
};
use crate::search::Query;

/// Read-only query interface over a mail archive backend.
///
/// Every method takes a cancellation handle as its first argument and is
/// safe to call from parallel threads. List operations return empty vectors
/// when nothing matches; detail lookups return `None` for unknown ids.
pub trait QueryEngine: Send + Sync {
    /// Aggregate the whole corpus by a dimension.
    fn aggregate(
        &self,
        cancel: &CancelToken,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        self.sub_aggregate(cancel, &MessageFilter::default(), view, opts)
    }

    /// Aggregate the messages matching a drill-down filter by a dimension.
    fn sub_aggregate(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>>;

    /// List message summaries matching a filter, labels populated.
    fn list_messages(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageSummary>>;

    /// Run a parsed search query, newest first.
    fn search(
        &self,
        cancel: &CancelToken,
        query: &Query,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageSummary>>;

    /// Search with a drill-down filter merged into the query.
    fn search_fast(
        &self,
        cancel: &CancelToken,
        query: &Query,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageSummary>>;

    /// Count the messages `search_fast` would return.
    fn search_fast_count(
        &self,
        cancel: &CancelToken,
        query: &Query,
        filter: &MessageFilter,
    ) -> Result<i64>;

    /// Search plus best-effort total count and per-dimension stats.
    ///
    /// Count and stats failures are logged and encoded as `-1` / `None`;
    /// the message page itself is still returned.
    fn search_fast_with_stats(
        &self,
        cancel: &CancelToken,
        query: &Query,
        query_str: &str,
        filter: &MessageFilter,
        stats_group_by: Option<ViewType>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchResults>;

    /// Fetch full message detail by internal id, including deleted messages.
    fn get_message(&self, cancel: &CancelToken, id: i64) -> Result<Option<MessageDetail>>;

    /// Fetch full message detail by source message id.
    fn get_message_by_source_id(
        &self,
        cancel: &CancelToken,
        source_id: &str,
    ) -> Result<Option<MessageDetail>>;

    /// Fetch attachment metadata by id.
    fn get_attachment(&self, cancel: &CancelToken, id: i64) -> Result<Option<AttachmentInfo>>;

    /// Enumerate source message ids for re-sync; always excludes messages
    /// deleted from the source.
    fn gmail_ids_by_filter(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
    ) -> Result<Vec<String>>;

    /// List accounts with message totals.
    fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<AccountInfo>>;

    /// Corpus totals, optionally restricted.
    fn total_stats(&self, cancel: &CancelToken, opts: &StatsOptions) -> Result<TotalStats>;
}
