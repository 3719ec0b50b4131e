//! SQL dialect differences between the row store and the columnar archive
//!
//! The two backends disagree on a handful of details: timestamp parameters
//! (DuckDB needs an explicit cast, SQLite compares RFC 3339 text), the
//! argument order of `strftime`, boolean storage, and case-insensitive LIKE.
//! Everything dialect-specific funnels through here so the fragment builders
//! never branch on the backend.

use chrono::{DateTime, Utc};

use crate::models::TimeGranularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    DuckDb,
}

impl Dialect {
    /// Placeholder for a timestamp parameter.
    pub fn timestamp_param(self) -> &'static str {
        match self {
            Dialect::Sqlite => "?",
            Dialect::DuckDb => "CAST(? AS TIMESTAMP)",
        }
    }

    /// Bindable text for a timestamp parameter.
    pub fn timestamp_arg(self, ts: DateTime<Utc>) -> SqlArg {
        let text = match self {
            Dialect::Sqlite => ts.to_rfc3339(),
            Dialect::DuckDb => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        SqlArg::Text(text)
    }

    /// Expression bucketing a timestamp column by granularity.
    pub fn time_bucket(self, column: &str, granularity: TimeGranularity) -> String {
        let fmt = granularity.format();
        match self {
            Dialect::Sqlite => format!("strftime('{fmt}', {column})"),
            Dialect::DuckDb => format!("strftime({column}, '{fmt}')"),
        }
    }

    /// Projection of a timestamp column as RFC 3339 text, so both backends
    /// produce rows the same mapping code can parse.
    pub fn timestamp_text(self, column: &str) -> String {
        match self {
            Dialect::Sqlite => column.to_string(),
            Dialect::DuckDb => format!("strftime({column}, '%Y-%m-%dT%H:%M:%S+00:00')"),
        }
    }

    /// Predicate testing a stored boolean column.
    pub fn is_true(self, column: &str) -> String {
        match self {
            // The row store keeps booleans as 0/1 integers
            Dialect::Sqlite => format!("{column} = 1"),
            Dialect::DuckDb => column.to_string(),
        }
    }

    /// Case-insensitive LIKE operator.
    pub fn ci_like(self) -> &'static str {
        match self {
            // SQLite LIKE is case-insensitive for ASCII by default
            Dialect::Sqlite => "LIKE",
            Dialect::DuckDb => "ILIKE",
        }
    }
}

/// A bound SQL argument usable with either backend.
///
/// Fragment builders never splice user data into SQL text; they emit `?`
/// placeholders and push one of these per placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl rusqlite::ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(match self {
            SqlArg::Int(v) => rusqlite::types::ToSqlOutput::from(*v),
            SqlArg::Text(v) => rusqlite::types::ToSqlOutput::from(v.as_str()),
        })
    }
}

impl duckdb::ToSql for SqlArg {
    fn to_sql(&self) -> duckdb::Result<duckdb::types::ToSqlOutput<'_>> {
        Ok(match self {
            SqlArg::Int(v) => duckdb::types::ToSqlOutput::from(*v),
            SqlArg::Text(v) => duckdb::types::ToSqlOutput::from(v.as_str()),
        })
    }
}
