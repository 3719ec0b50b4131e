//! Domain models for archive entities and query values

mod filter;
mod results;
mod view;

pub use filter::{AggregateOptions, MessageFilter, StatsOptions};
pub use results::{
    AccountInfo, Address, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary,
    SearchResults, TotalStats,
};
pub use view::{MessageSortField, SortDirection, SortField, TimeGranularity, ViewType};
