//! Query engine implementations
//!
//! [`SqliteEngine`] serves every operation from the row store;
//! [`DuckDbEngine`] serves scans and aggregates from the columnar archive
//! and delegates text search and message detail to a row-store reference.

mod duckdb;
mod sqlite;

pub use duckdb::DuckDbEngine;
pub use sqlite::SqliteEngine;

use chrono::{DateTime, Utc};

use crate::models::ViewType;
use crate::query::dialect::{Dialect, SqlArg};
use crate::search::Query;
use crate::search::sql::{CompiledQuery, TextScope, compile_query, split_label_view_query};

/// Parse an RFC 3339 timestamp projected by either backend.
pub(crate) fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Compile an aggregate's search query for a view.
///
/// On the Labels dimension, label and free-text terms filter the grouping
/// column directly instead of adding a second labels join; the returned
/// extra conditions apply to the `l` alias. Other views lower the whole
/// query generically.
pub(crate) fn compile_view_search(
    query: &Query,
    view: ViewType,
    dialect: Dialect,
    fts_available: bool,
) -> (CompiledQuery, Vec<String>, Vec<SqlArg>) {
    if view == ViewType::Labels {
        let split = split_label_view_query(query);
        let compiled = compile_query(&split.residual, dialect, false, TextScope::MessageText);
        (compiled, split.conds, split.args)
    } else {
        let compiled = compile_query(query, dialect, fts_available, TextScope::MessageText);
        (compiled, Vec::new(), Vec::new())
    }
}
