//! Columnar query engine over the Parquet archive
//!
//! Serves aggregates and filtered scans from DuckDB views over the
//! partitioned archive. Paths that need full text or raw MIME (text
//! search, message detail) delegate to a row-store engine reference and
//! fail with a validation error when none is configured.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use duckdb::{Connection, params_from_iter};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::{
    AccountInfo, AggregateOptions, AggregateRow, AttachmentInfo, MessageDetail, MessageFilter,
    MessageSummary, SearchResults, StatsOptions, TotalStats, ViewType,
};
use crate::query::QueryEngine;
use crate::query::builders::{
    accounts_sql, gmail_ids_sql, labels_batch_sql, list_sql, search_count_sql, search_sql,
    stats_sql,
};
use crate::query::dialect::{Dialect, SqlArg};
use crate::query::dimensions::aggregate_sql;
use crate::query::filter_sql::compile_filter;
use crate::search::sql::{TextScope, compile_query};
use crate::search::{Query, merge_filter_into_query, parse_query};

use super::{compile_view_search, parse_timestamp};

/// Tables materialized in the archive, in view-creation order.
pub(crate) const ARCHIVE_TABLES: [&str; 8] = [
    "sources",
    "participants",
    "conversations",
    "messages",
    "message_recipients",
    "labels",
    "message_labels",
    "attachments",
];

/// Query engine over the columnar archive.
pub struct DuckDbEngine {
    conn: Mutex<Connection>,
    archive_dir: PathBuf,
    row_store: Option<Arc<super::SqliteEngine>>,
}

impl DuckDbEngine {
    /// Open the archive at a directory, creating one view per table.
    ///
    /// The connection's worker-thread setting persists across statements;
    /// `threads` defaults to the host's available parallelism.
    pub fn open(archive_dir: impl AsRef<Path>, threads: Option<usize>) -> Result<Self> {
        let archive_dir = archive_dir.as_ref().to_path_buf();
        let conn =
            Connection::open_in_memory().map_err(|e| Error::columnar("open archive", e))?;

        let threads = threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        conn.execute_batch(&format!("SET threads TO {threads};"))
            .map_err(|e| Error::columnar("configure archive", e))?;

        for table in ARCHIVE_TABLES {
            let glob = if table == "messages" {
                archive_dir.join("messages").join("year=*").join("*.parquet")
            } else {
                archive_dir.join(table).join("*.parquet")
            };
            let glob = glob.to_string_lossy().replace('\'', "''");
            conn.execute_batch(&format!(
                "CREATE VIEW {table} AS SELECT * FROM read_parquet('{glob}');"
            ))
            .map_err(|e| Error::columnar("open archive view", e))?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            archive_dir,
            row_store: None,
        })
    }

    /// Attach the row-store engine used for text search and message detail.
    pub fn with_row_store(mut self, row_store: Arc<super::SqliteEngine>) -> Self {
        self.row_store = Some(row_store);
        self
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    fn row_store(&self, operation: &str) -> Result<&Arc<super::SqliteEngine>> {
        self.row_store.as_ref().ok_or_else(|| {
            Error::validation(format!(
                "columnar engine has no row-store reference for {operation}"
            ))
        })
    }

    fn query_summaries(
        &self,
        cancel: &CancelToken,
        op: &'static str,
        sql: &str,
        args: &[SqlArg],
    ) -> Result<Vec<MessageSummary>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(sql).map_err(|e| Error::columnar(op, e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| Error::columnar(op, e))?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::columnar(op, e))? {
            cancel.check()?;
            summaries.push(summary_from_row(row).map_err(|e| Error::columnar(op, e))?);
        }
        drop(rows);
        drop(stmt);

        attach_labels(&conn, cancel, &mut summaries)?;
        Ok(summaries)
    }

    fn run_aggregate(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
        search: Option<&Query>,
    ) -> Result<Vec<AggregateRow>> {
        cancel.check()?;
        let filter_sql = compile_filter(filter, Dialect::DuckDb)?;

        let compiled =
            search.map(|query| compile_view_search(query, view, Dialect::DuckDb, false));
        let (search_compiled, label_conds, label_args) = match &compiled {
            Some((compiled, conds, args)) => (Some(compiled), conds.as_slice(), args.as_slice()),
            None => (None, [].as_slice(), [].as_slice()),
        };

        let (sql, args) = aggregate_sql(
            Dialect::DuckDb,
            view,
            opts,
            &filter_sql,
            search_compiled,
            label_conds,
            label_args,
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::columnar("aggregate query", e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| Error::columnar("aggregate query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::columnar("aggregate scan", e))? {
            cancel.check()?;
            out.push(AggregateRow {
                key: row.get(0).map_err(|e| Error::columnar("aggregate scan", e))?,
                count: row.get(1).map_err(|e| Error::columnar("aggregate scan", e))?,
                total_size: row.get(2).map_err(|e| Error::columnar("aggregate scan", e))?,
                attachment_size: row.get(3).map_err(|e| Error::columnar("aggregate scan", e))?,
                attachment_count: row.get(4).map_err(|e| Error::columnar("aggregate scan", e))?,
                total_unique: row.get(5).map_err(|e| Error::columnar("aggregate scan", e))?,
            });
        }
        Ok(out)
    }
}

fn summary_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<MessageSummary> {
    let sent_at: String = row.get(7)?;
    let received_at: Option<String> = row.get(8)?;
    let deleted_at: Option<String> = row.get(12)?;
    Ok(MessageSummary {
        id: row.get(0)?,
        source_id: row.get(1)?,
        conversation_id: row.get(2)?,
        gmail_id: row.get(3)?,
        thread_id: row.get(4)?,
        subject: row.get(5)?,
        snippet: row.get(6)?,
        sent_at: parse_timestamp(&sent_at),
        received_at: received_at.as_deref().map(parse_timestamp),
        size_estimate: row.get(9)?,
        has_attachments: row.get(10)?,
        attachment_count: row.get(11)?,
        deleted_from_source: deleted_at.is_some(),
        from_email: row.get(13)?,
        from_name: row.get(14)?,
        labels: Vec::new(),
    })
}

fn attach_labels(
    conn: &Connection,
    cancel: &CancelToken,
    summaries: &mut [MessageSummary],
) -> Result<()> {
    if summaries.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = summaries.iter().map(|s| s.id).collect();
    let sql = labels_batch_sql(ids.len());
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::columnar("label batch query", e))?;
    let mut rows = stmt
        .query(params_from_iter(ids.iter()))
        .map_err(|e| Error::columnar("label batch query", e))?;

    let mut by_message: HashMap<i64, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next().map_err(|e| Error::columnar("label batch scan", e))? {
        cancel.check()?;
        let message_id: i64 = row.get(0).map_err(|e| Error::columnar("label batch scan", e))?;
        let name: String = row.get(1).map_err(|e| Error::columnar("label batch scan", e))?;
        by_message.entry(message_id).or_default().push(name);
    }

    for summary in summaries {
        if let Some(labels) = by_message.remove(&summary.id) {
            summary.labels = labels;
        }
    }
    Ok(())
}

impl QueryEngine for DuckDbEngine {
    fn sub_aggregate(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        let parsed = if opts.search_query.trim().is_empty() {
            None
        } else {
            Some(parse_query(&opts.search_query))
        };
        self.run_aggregate(cancel, filter, view, opts, parsed.as_ref())
    }

    fn list_messages(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageSummary>> {
        let filter_sql = compile_filter(filter, Dialect::DuckDb)?;
        let (sql, args) = list_sql(
            Dialect::DuckDb,
            &filter_sql,
            filter.sort_by,
            filter.sort_dir,
            filter.limit,
            filter.offset,
        );
        self.query_summaries(cancel, "list query", &sql, &args)
    }

    fn search(
        &self,
        cancel: &CancelToken,
        query: &Query,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageSummary>> {
        self.row_store("text search")?.search(cancel, query, limit, offset)
    }

    fn search_fast(
        &self,
        cancel: &CancelToken,
        query: &Query,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageSummary>> {
        let merged = merge_filter_into_query(query, filter);
        let compiled = compile_query(&merged, Dialect::DuckDb, false, TextScope::MessageText);
        let (sql, args) = search_sql(Dialect::DuckDb, &compiled, limit, offset);
        self.query_summaries(cancel, "search query", &sql, &args)
    }

    fn search_fast_count(
        &self,
        cancel: &CancelToken,
        query: &Query,
        filter: &MessageFilter,
    ) -> Result<i64> {
        cancel.check()?;
        let merged = merge_filter_into_query(query, filter);
        let compiled = compile_query(&merged, Dialect::DuckDb, false, TextScope::MessageText);
        let (sql, args) = search_count_sql(&compiled);

        let conn = self.conn.lock().unwrap();
        conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            .map_err(|e| Error::columnar("count query", e))
    }

    fn search_fast_with_stats(
        &self,
        cancel: &CancelToken,
        query: &Query,
        query_str: &str,
        filter: &MessageFilter,
        stats_group_by: Option<ViewType>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchResults> {
        let messages = self.search_fast(cancel, query, filter, limit, offset)?;

        let total_count = match self.search_fast_count(cancel, query, filter) {
            Ok(count) => count,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                log::warn!("total count failed for {query_str:?}: {e}");
                -1
            }
        };

        let stats = match stats_group_by {
            Some(view) => {
                let merged = merge_filter_into_query(query, filter);
                let opts = AggregateOptions::default();
                match self.run_aggregate(
                    cancel,
                    &MessageFilter::default(),
                    view,
                    &opts,
                    Some(&merged),
                ) {
                    Ok(rows) => Some(rows),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        log::warn!("stats failed for {query_str:?}: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SearchResults {
            messages,
            total_count,
            stats,
        })
    }

    fn get_message(&self, cancel: &CancelToken, id: i64) -> Result<Option<MessageDetail>> {
        self.row_store("message detail")?.get_message(cancel, id)
    }

    fn get_message_by_source_id(
        &self,
        cancel: &CancelToken,
        source_id: &str,
    ) -> Result<Option<MessageDetail>> {
        self.row_store("message detail")?
            .get_message_by_source_id(cancel, source_id)
    }

    fn get_attachment(&self, cancel: &CancelToken, id: i64) -> Result<Option<AttachmentInfo>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, message_id, filename, mime_type, size, content_hash \
                 FROM attachments WHERE id = ?",
            )
            .map_err(|e| Error::columnar("attachment lookup", e))?;
        let mut rows = stmt
            .query([id])
            .map_err(|e| Error::columnar("attachment lookup", e))?;

        let Some(row) = rows.next().map_err(|e| Error::columnar("attachment lookup", e))? else {
            return Ok(None);
        };
        Ok(Some(AttachmentInfo {
            id: row.get(0).map_err(|e| Error::columnar("attachment lookup", e))?,
            message_id: row.get(1).map_err(|e| Error::columnar("attachment lookup", e))?,
            filename: row.get(2).map_err(|e| Error::columnar("attachment lookup", e))?,
            mime_type: row.get(3).map_err(|e| Error::columnar("attachment lookup", e))?,
            size: row.get(4).map_err(|e| Error::columnar("attachment lookup", e))?,
            content_hash: row.get(5).map_err(|e| Error::columnar("attachment lookup", e))?,
        }))
    }

    fn gmail_ids_by_filter(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
    ) -> Result<Vec<String>> {
        cancel.check()?;
        let filter_sql = compile_filter(filter, Dialect::DuckDb)?;
        let (sql, args) = gmail_ids_sql(
            Dialect::DuckDb,
            &filter_sql,
            filter.hide_deleted_from_source,
            filter.limit,
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::columnar("id query", e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| Error::columnar("id query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::columnar("id scan", e))? {
            cancel.check()?;
            out.push(row.get(0).map_err(|e| Error::columnar("id scan", e))?);
        }
        Ok(out)
    }

    fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<AccountInfo>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(accounts_sql())
            .map_err(|e| Error::columnar("account query", e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| Error::columnar("account query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::columnar("account scan", e))? {
            cancel.check()?;
            out.push(AccountInfo {
                id: row.get(0).map_err(|e| Error::columnar("account scan", e))?,
                source_type: row.get(1).map_err(|e| Error::columnar("account scan", e))?,
                identifier: row.get(2).map_err(|e| Error::columnar("account scan", e))?,
                display_name: row.get(3).map_err(|e| Error::columnar("account scan", e))?,
                message_count: row.get(4).map_err(|e| Error::columnar("account scan", e))?,
                total_size: row.get(5).map_err(|e| Error::columnar("account scan", e))?,
            });
        }
        Ok(out)
    }

    fn total_stats(&self, cancel: &CancelToken, opts: &StatsOptions) -> Result<TotalStats> {
        cancel.check()?;
        let compiled = if opts.search_query.trim().is_empty() {
            None
        } else {
            let parsed = parse_query(&opts.search_query);
            let scope = match opts.group_by {
                Some(ViewType::Recipients) => TextScope::RecipientKeys,
                Some(ViewType::Labels) => TextScope::LabelKeys,
                _ => TextScope::MessageText,
            };
            Some(compile_query(&parsed, Dialect::DuckDb, false, scope))
        };

        let ((message_sql, message_args), (attachment_sql, attachment_args)) = stats_sql(
            Dialect::DuckDb,
            opts.source_id,
            opts.with_attachments_only,
            compiled.as_ref(),
        );

        let conn = self.conn.lock().unwrap();
        let (message_count, total_size) = conn
            .query_row(&message_sql, params_from_iter(message_args.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|e| Error::columnar("stats query", e))?;
        let (attachment_count, attachment_size) = conn
            .query_row(
                &attachment_sql,
                params_from_iter(attachment_args.iter()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::columnar("stats query", e))?;

        Ok(TotalStats {
            message_count,
            total_size,
            attachment_count,
            attachment_size,
        })
    }
}
