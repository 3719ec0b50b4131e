//! Vault crate - Query engine for a local mail archive
//!
//! This crate provides faceted browsing, drill-down, and Gmail-style text
//! search over an ingested mail corpus held in two redundant stores:
//! - A row-oriented SQLite store for full detail retrieval and optional
//!   full-text search
//! - A columnar Parquet archive read through DuckDB for fast aggregation
//!   and filtered scans
//!
//! Both backends implement the same [`QueryEngine`] trait; all engine
//! operations are read-only and cancellable. The crate also carries the
//! ingest writer that populates the row store and the archive writer that
//! rewrites the columnar partitions.

pub mod archive;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod models;
pub mod query;
pub mod search;
pub mod storage;

pub use cancel::CancelToken;
pub use engine::{DuckDbEngine, SqliteEngine};
pub use error::{Error, Result};
pub use models::{
    AccountInfo, Address, AggregateOptions, AggregateRow, AttachmentInfo, MessageDetail,
    MessageFilter, MessageSortField, MessageSummary, SearchResults, SortDirection, SortField,
    StatsOptions, TimeGranularity, TotalStats, ViewType,
};
pub use query::QueryEngine;
pub use search::{Query, merge_filter_into_query, parse_query};
