//! Columnar archive layout and partition writer
//!
//! The archive is a directory of Parquet files, one subdirectory per table,
//! with messages partitioned by year (`messages/year=YYYY/*.parquet`).
//! Empty tables are represented by schema-only files so the reader's views
//! always bind.

mod writer;

pub use writer::{ArchiveStats, build_archive, build_archive_from_connection};

use std::path::{Path, PathBuf};

/// Directory holding one table's Parquet files.
pub fn table_dir(root: &Path, table: &str) -> PathBuf {
    root.join(table)
}

/// Directory holding one year's message partition.
pub fn message_partition_dir(root: &Path, year: i64) -> PathBuf {
    root.join("messages").join(format!("year={year:04}"))
}
