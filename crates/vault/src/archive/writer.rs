//! Archive rebuild: row store -> partitioned Parquet
//!
//! Stages the row store's tables into an in-memory DuckDB database, then
//! COPYs each table out as Parquet. Rebuilding rewrites partitions in
//! place, which also repairs archives holding invalid string data.

use std::path::Path;

use rayon::prelude::*;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::storage;

use super::{message_partition_dir, table_dir};

/// Tables staged and copied besides messages.
const SIMPLE_TABLES: [&str; 7] = [
    "sources",
    "participants",
    "conversations",
    "message_recipients",
    "labels",
    "message_labels",
    "attachments",
];

const STAGING_SCHEMA: &str = r#"
    CREATE TABLE sources (
        id BIGINT, source_type VARCHAR, identifier VARCHAR, display_name VARCHAR
    );
    CREATE TABLE participants (
        id BIGINT, email_address VARCHAR, domain VARCHAR, display_name VARCHAR
    );
    CREATE TABLE conversations (
        id BIGINT, source_id BIGINT, source_conversation_id VARCHAR, title VARCHAR
    );
    CREATE TABLE messages (
        id BIGINT, source_id BIGINT, conversation_id BIGINT,
        source_message_id VARCHAR, subject VARCHAR, snippet VARCHAR,
        sent_at TIMESTAMP, received_at TIMESTAMP, size_estimate BIGINT,
        has_attachments BOOLEAN, attachment_count BIGINT,
        deleted_from_source_at TIMESTAMP
    );
    CREATE TABLE message_recipients (
        id BIGINT, message_id BIGINT, participant_id BIGINT,
        recipient_type VARCHAR, display_name VARCHAR
    );
    CREATE TABLE labels (
        id BIGINT, source_id BIGINT, source_label_id VARCHAR,
        name VARCHAR, label_type VARCHAR
    );
    CREATE TABLE message_labels (message_id BIGINT, label_id BIGINT);
    CREATE TABLE attachments (
        id BIGINT, message_id BIGINT, filename VARCHAR, mime_type VARCHAR,
        size BIGINT, content_hash VARCHAR
    );
"#;

/// Result of an archive rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub messages: u64,
    pub partitions: usize,
}

/// Rebuild the archive at `archive_root` from the row store at `db_path`.
pub fn build_archive(
    db_path: impl AsRef<Path>,
    archive_root: impl AsRef<Path>,
) -> Result<ArchiveStats> {
    let conn = storage::open_row_store(db_path)?;
    build_archive_from_connection(&conn, archive_root)
}

/// Rebuild the archive from an open row-store connection.
pub fn build_archive_from_connection(
    sqlite: &Connection,
    archive_root: impl AsRef<Path>,
) -> Result<ArchiveStats> {
    let root = archive_root.as_ref();

    let duck =
        duckdb::Connection::open_in_memory().map_err(|e| Error::columnar("open staging", e))?;
    duck.execute_batch(STAGING_SCHEMA)
        .map_err(|e| Error::columnar("create staging schema", e))?;

    let message_count = stage_messages(sqlite, &duck)?;
    stage_simple_tables(sqlite, &duck)?;

    // Rewrite partitions from scratch.
    for table in SIMPLE_TABLES.iter().chain(std::iter::once(&"messages")) {
        let dir = table_dir(root, table);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::backend("clear archive partition", e)),
        }
    }

    for table in SIMPLE_TABLES {
        let dir = table_dir(root, table);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::backend("create archive partition", e))?;
        copy_to_parquet(
            &duck,
            &format!("SELECT * FROM {table}"),
            &dir.join("part-00000.parquet"),
        )?;
    }

    let years = message_years(&duck)?;
    let partitions = write_message_partitions(&duck, root, &years)?;

    log::debug!("archive rebuilt: {message_count} messages across {partitions} partitions");
    Ok(ArchiveStats {
        messages: message_count,
        partitions,
    })
}

/// Write one partition per message year, in parallel. An empty corpus gets
/// a single schema-only partition so the reader's glob still matches.
fn write_message_partitions(
    duck: &duckdb::Connection,
    root: &Path,
    years: &[i64],
) -> Result<usize> {
    if years.is_empty() {
        let dir = message_partition_dir(root, 0);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::backend("create archive partition", e))?;
        copy_to_parquet(
            duck,
            "SELECT * FROM messages WHERE 1 = 0",
            &dir.join("part-00000.parquet"),
        )?;
        return Ok(1);
    }

    let clones: Vec<(i64, duckdb::Connection)> = years
        .iter()
        .map(|&year| {
            let conn = duck
                .try_clone()
                .map_err(|e| Error::columnar("clone staging connection", e))?;
            Ok((year, conn))
        })
        .collect::<Result<_>>()?;

    clones
        .into_par_iter()
        .map(|(year, conn)| {
            let dir = message_partition_dir(root, year);
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::backend("create archive partition", e))?;
            copy_to_parquet(
                &conn,
                &format!("SELECT * FROM messages WHERE year(sent_at) = {year}"),
                &dir.join("part-00000.parquet"),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(years.len())
}

fn message_years(duck: &duckdb::Connection) -> Result<Vec<i64>> {
    let mut stmt = duck
        .prepare("SELECT DISTINCT year(sent_at) FROM messages ORDER BY 1")
        .map_err(|e| Error::columnar("list partition years", e))?;
    let years = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| Error::columnar("list partition years", e))?
        .collect::<duckdb::Result<Vec<i64>>>()
        .map_err(|e| Error::columnar("list partition years", e))?;
    Ok(years)
}

fn copy_to_parquet(duck: &duckdb::Connection, select: &str, path: &Path) -> Result<()> {
    let path = path.to_string_lossy().replace('\'', "''");
    duck.execute_batch(&format!("COPY ({select}) TO '{path}' (FORMAT PARQUET);"))
        .map_err(|e| Error::columnar("write parquet", e))
}

fn stage_messages(sqlite: &Connection, duck: &duckdb::Connection) -> Result<u64> {
    let mut stmt = sqlite
        .prepare(
            "SELECT id, source_id, conversation_id, source_message_id, subject, snippet,
             sent_at, received_at, size_estimate, has_attachments, attachment_count,
             deleted_from_source_at
             FROM messages",
        )
        .map_err(|e| Error::backend("read messages", e))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| Error::backend("read messages", e))?;

    let mut insert = duck
        .prepare(
            "INSERT INTO messages VALUES
             (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?,
              CAST(? AS TIMESTAMP))",
        )
        .map_err(|e| Error::columnar("stage messages", e))?;

    let mut count = 0u64;
    while let Some(row) = rows.next().map_err(|e| Error::backend("read messages", e))? {
        let mapped: rusqlite::Result<_> = (|| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, bool>(9)?,
                row.get::<_, i64>(10)?,
                row.get::<_, Option<String>>(11)?,
            ))
        })();
        let (
            id,
            source_id,
            conversation_id,
            source_message_id,
            subject,
            snippet,
            sent_at,
            received_at,
            size_estimate,
            has_attachments,
            attachment_count,
            deleted_at,
        ) = mapped.map_err(|e| Error::backend("read messages", e))?;

        insert
            .execute(duckdb::params![
                id,
                source_id,
                conversation_id,
                source_message_id,
                subject,
                snippet,
                sent_at,
                received_at,
                size_estimate,
                has_attachments,
                attachment_count,
                deleted_at,
            ])
            .map_err(|e| Error::columnar("stage messages", e))?;
        count += 1;
    }
    Ok(count)
}

/// Copy the non-partitioned tables row by row.
///
/// Columns are read as nullable text/integers; DuckDB's staging schema
/// assigns the final types.
fn stage_simple_tables(sqlite: &Connection, duck: &duckdb::Connection) -> Result<()> {
    let specs: [(&str, &str, usize); 7] = [
        (
            "SELECT id, source_type, identifier, display_name FROM sources",
            "INSERT INTO sources VALUES (?, ?, ?, ?)",
            4,
        ),
        (
            "SELECT id, email_address, domain, display_name FROM participants",
            "INSERT INTO participants VALUES (?, ?, ?, ?)",
            4,
        ),
        (
            "SELECT id, source_id, source_conversation_id, title FROM conversations",
            "INSERT INTO conversations VALUES (?, ?, ?, ?)",
            4,
        ),
        (
            "SELECT id, message_id, participant_id, recipient_type, display_name \
             FROM message_recipients",
            "INSERT INTO message_recipients VALUES (?, ?, ?, ?, ?)",
            5,
        ),
        (
            "SELECT id, source_id, source_label_id, name, label_type FROM labels",
            "INSERT INTO labels VALUES (?, ?, ?, ?, ?)",
            5,
        ),
        (
            "SELECT message_id, label_id FROM message_labels",
            "INSERT INTO message_labels VALUES (?, ?)",
            2,
        ),
        (
            "SELECT id, message_id, filename, mime_type, size, content_hash FROM attachments",
            "INSERT INTO attachments VALUES (?, ?, ?, ?, ?, ?)",
            6,
        ),
    ];

    for (select, insert_sql, columns) in specs {
        stage_table(sqlite, duck, select, insert_sql, columns)?;
    }
    Ok(())
}

/// One staged column value: every simple-table column is an integer, text,
/// or NULL in SQLite's dynamic typing.
enum Staged {
    Null,
    Int(i64),
    Text(String),
}

impl duckdb::ToSql for Staged {
    fn to_sql(&self) -> duckdb::Result<duckdb::types::ToSqlOutput<'_>> {
        Ok(match self {
            Staged::Null => duckdb::types::ToSqlOutput::Owned(duckdb::types::Value::Null),
            Staged::Int(v) => duckdb::types::ToSqlOutput::from(*v),
            Staged::Text(v) => duckdb::types::ToSqlOutput::from(v.as_str()),
        })
    }
}

fn stage_table(
    sqlite: &Connection,
    duck: &duckdb::Connection,
    select: &str,
    insert_sql: &str,
    columns: usize,
) -> Result<()> {
    let mut stmt = sqlite
        .prepare(select)
        .map_err(|e| Error::backend("read table", e))?;
    let mut rows = stmt.query([]).map_err(|e| Error::backend("read table", e))?;

    let mut insert = duck
        .prepare(insert_sql)
        .map_err(|e| Error::columnar("stage table", e))?;

    while let Some(row) = rows.next().map_err(|e| Error::backend("read table", e))? {
        let mut values = Vec::with_capacity(columns);
        for index in 0..columns {
            let value = match row
                .get_ref(index)
                .map_err(|e| Error::backend("read table", e))?
            {
                rusqlite::types::ValueRef::Null => Staged::Null,
                rusqlite::types::ValueRef::Integer(v) => Staged::Int(v),
                rusqlite::types::ValueRef::Real(v) => Staged::Int(v as i64),
                rusqlite::types::ValueRef::Text(v) => {
                    Staged::Text(String::from_utf8_lossy(v).into_owned())
                }
                rusqlite::types::ValueRef::Blob(_) => Staged::Null,
            };
            values.push(value);
        }
        insert
            .execute(duckdb::params_from_iter(values.iter()))
            .map_err(|e| Error::columnar("stage table", e))?;
    }
    Ok(())
}
