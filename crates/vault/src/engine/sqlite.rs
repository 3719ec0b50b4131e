//! Row-store query engine
//!
//! Serves the full [`QueryEngine`] contract from the transactional SQLite
//! store, including full-text search when the `messages_fts` table exists
//! and message detail with the raw-MIME body fallback.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use flate2::read::ZlibDecoder;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::{
    AccountInfo, Address, AggregateOptions, AggregateRow, AttachmentInfo, MessageDetail,
    MessageFilter, MessageSummary, SearchResults, StatsOptions, TotalStats, ViewType,
};
use crate::query::QueryEngine;
use crate::query::builders::{
    accounts_sql, gmail_ids_sql, labels_batch_sql, list_sql, search_count_sql, search_sql,
    stats_sql,
};
use crate::query::dialect::{Dialect, SqlArg};
use crate::query::dimensions::aggregate_sql;
use crate::query::filter_sql::compile_filter;
use crate::search::sql::{CompiledQuery, TextScope, compile_query};
use crate::search::{Query, merge_filter_into_query, parse_query};
use crate::storage;

use super::{compile_view_search, parse_timestamp};

/// Cached result of the FTS availability probe.
///
/// `present` is meaningful only once `checked` is true. Probe errors leave
/// the cache untouched so the next call retries.
#[derive(Debug, Default)]
struct FtsProbe {
    checked: bool,
    present: bool,
}

/// Query engine over the row store.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
    fts: Mutex<FtsProbe>,
}

impl SqliteEngine {
    /// Open (and migrate) the row store at a path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(storage::open_row_store(db_path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            fts: Mutex::new(FtsProbe::default()),
        }
    }

    /// Probe for the FTS table, caching successful probes for the engine's
    /// lifetime. Errors report "absent" without caching.
    fn fts_available(&self) -> bool {
        let mut probe = self.fts.lock().unwrap();
        if probe.checked {
            return probe.present;
        }

        let conn = self.conn.lock().unwrap();
        let count: rusqlite::Result<i64> = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'messages_fts'",
            [],
            |row| row.get(0),
        );
        match count {
            Ok(count) => {
                probe.checked = true;
                probe.present = count >= 1;
                log::debug!("full-text index probe: present = {}", probe.present);
                probe.present
            }
            Err(e) => {
                log::warn!("full-text index probe failed: {e}");
                false
            }
        }
    }

    /// Compile a parsed query, choosing the FTS or LIKE text path.
    fn compile_search(&self, query: &Query, scope: TextScope) -> CompiledQuery {
        let fts = !query.text_terms.is_empty()
            && scope == TextScope::MessageText
            && self.fts_available();
        compile_query(query, Dialect::Sqlite, fts, scope)
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
        let mut summaries = collect_summaries(&conn, cancel, op, sql, args)?;
        attach_labels(&conn, cancel, &mut summaries)?;
        Ok(summaries)
    }

    /// Aggregate with an optional pre-parsed search query.
    fn run_aggregate(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
        search: Option<&Query>,
    ) -> Result<Vec<AggregateRow>> {
        cancel.check()?;
        let filter_sql = compile_filter(filter, Dialect::Sqlite)?;

        let compiled = search.map(|query| {
            let fts = !query.text_terms.is_empty() && view != ViewType::Labels && self.fts_available();
            compile_view_search(query, view, Dialect::Sqlite, fts)
        });
        let (search_compiled, label_conds, label_args) = match &compiled {
            Some((compiled, conds, args)) => (Some(compiled), conds.as_slice(), args.as_slice()),
            None => (None, [].as_slice(), [].as_slice()),
        };

        let (sql, args) = aggregate_sql(
            Dialect::Sqlite,
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
            .map_err(|e| Error::backend("aggregate query", e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| Error::backend("aggregate query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::backend("aggregate scan", e))? {
            cancel.check()?;
            out.push(
                aggregate_row(row).map_err(|e| Error::backend("aggregate scan", e))?,
            );
        }
        Ok(out)
    }

    fn detail_where(
        &self,
        cancel: &CancelToken,
        cond: &str,
        arg: SqlArg,
    ) -> Result<Option<MessageDetail>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();

        let sql = format!("{} WHERE {cond} LIMIT 1", detail_base_sql());
        let mut summaries = collect_summaries(&conn, cancel, "message lookup", &sql, &[arg])?;
        attach_labels(&conn, cancel, &mut summaries)?;
        let Some(summary) = summaries.pop() else {
            return Ok(None);
        };
        let message_id = summary.id;

        let (mut body_text, body_html) = load_body(&conn, message_id)?;
        if body_text.as_deref().is_none_or(str::is_empty) {
            if let Some(raw_text) = load_raw_text(&conn, message_id)? {
                body_text = Some(raw_text);
            }
        }

        let (to, cc, bcc) = load_recipients(&conn, cancel, message_id)?;
        let attachments = load_attachments(&conn, cancel, message_id)?;

        Ok(Some(MessageDetail {
            summary,
            body_text,
            body_html,
            to,
            cc,
            bcc,
            attachments,
        }))
    }

    #[cfg(test)]
    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

/// Shared SELECT for detail lookups (same projection as list queries).
pub(crate) fn detail_base_sql() -> String {
    "SELECT m.id AS id, m.source_id AS source_id, m.conversation_id AS conversation_id, \
     m.source_message_id AS gmail_id, c.source_conversation_id AS thread_id, \
     m.subject AS subject, m.snippet AS snippet, \
     m.sent_at AS sent_at, m.received_at AS received_at, \
     m.size_estimate AS size_estimate, m.has_attachments AS has_attachments, \
     m.attachment_count AS attachment_count, m.deleted_from_source_at AS deleted_at, \
     p_from.email_address AS from_email, \
     COALESCE(NULLIF(TRIM(mr_from.display_name), ''), p_from.display_name) AS from_name\n\
     FROM messages m\n\
     LEFT JOIN message_recipients mr_from ON mr_from.message_id = m.id \
     AND mr_from.recipient_type = 'from'\n\
     LEFT JOIN participants p_from ON p_from.id = mr_from.participant_id\n\
     LEFT JOIN conversations c ON c.id = m.conversation_id"
        .to_string()
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageSummary> {
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

fn aggregate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        key: row.get(0)?,
        count: row.get(1)?,
        total_size: row.get(2)?,
        attachment_size: row.get(3)?,
        attachment_count: row.get(4)?,
        total_unique: row.get(5)?,
    })
}

fn collect_summaries(
    conn: &Connection,
    cancel: &CancelToken,
    op: &'static str,
    sql: &str,
    args: &[SqlArg],
) -> Result<Vec<MessageSummary>> {
    let mut stmt = conn.prepare(sql).map_err(|e| Error::backend(op, e))?;
    let mut rows = stmt
        .query(params_from_iter(args.iter()))
        .map_err(|e| Error::backend(op, e))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| Error::backend(op, e))? {
        cancel.check()?;
        out.push(summary_from_row(row).map_err(|e| Error::backend(op, e))?);
    }
    Ok(out)
}

/// Populate label lists for a page of summaries with one IN query,
/// preserving the page's row order.
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
        .map_err(|e| Error::backend("label batch query", e))?;
    let mut rows = stmt
        .query(params_from_iter(ids.iter()))
        .map_err(|e| Error::backend("label batch query", e))?;

    let mut by_message: HashMap<i64, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next().map_err(|e| Error::backend("label batch scan", e))? {
        cancel.check()?;
        let message_id: i64 = row.get(0).map_err(|e| Error::backend("label batch scan", e))?;
        let name: String = row.get(1).map_err(|e| Error::backend("label batch scan", e))?;
        by_message.entry(message_id).or_default().push(name);
    }

    for summary in summaries {
        if let Some(labels) = by_message.remove(&summary.id) {
            summary.labels = labels;
        }
    }
    Ok(())
}

fn load_body(conn: &Connection, message_id: i64) -> Result<(Option<String>, Option<String>)> {
    let row: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT body_text, body_html FROM message_bodies WHERE message_id = ?",
            [message_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::backend("body query", e))?;
    Ok(row.unwrap_or((None, None)))
}

/// Fall back to the stored raw message: decompress when flagged, parse the
/// MIME structure, and pull out the first text/plain part.
fn load_raw_text(conn: &Connection, message_id: i64) -> Result<Option<String>> {
    let row: Option<(Vec<u8>, bool)> = conn
        .query_row(
            "SELECT raw, compressed FROM message_raw WHERE message_id = ?",
            [message_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::backend("raw body query", e))?;

    let Some((blob, compressed)) = row else {
        return Ok(None);
    };

    let bytes = if compressed {
        let mut decoder = ZlibDecoder::new(blob.as_slice());
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|e| Error::backend("decompress raw body", e))?;
        decoded
    } else {
        blob
    };

    let parsed = mailparse::parse_mail(&bytes).map_err(|e| Error::backend("parse raw body", e))?;
    Ok(extract_text_body(&parsed))
}

/// Depth-first search for the first text/plain part.
fn extract_text_body(part: &mailparse::ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return part.get_body().ok();
        }
        return None;
    }
    part.subparts.iter().find_map(extract_text_body)
}

fn load_recipients(
    conn: &Connection,
    cancel: &CancelToken,
    message_id: i64,
) -> Result<(Vec<Address>, Vec<Address>, Vec<Address>)> {
    let mut stmt = conn
        .prepare(
            "SELECT mr.recipient_type, \
             COALESCE(NULLIF(TRIM(mr.display_name), ''), p.display_name) AS name, \
             p.email_address\n\
             FROM message_recipients mr\n\
             LEFT JOIN participants p ON p.id = mr.participant_id\n\
             WHERE mr.message_id = ?\n\
             ORDER BY mr.id",
        )
        .map_err(|e| Error::backend("recipient query", e))?;
    let mut rows = stmt
        .query([message_id])
        .map_err(|e| Error::backend("recipient query", e))?;

    let (mut to, mut cc, mut bcc) = (Vec::new(), Vec::new(), Vec::new());
    while let Some(row) = rows.next().map_err(|e| Error::backend("recipient scan", e))? {
        cancel.check()?;
        let recipient_type: String = row.get(0).map_err(|e| Error::backend("recipient scan", e))?;
        let address = Address {
            name: row.get(1).map_err(|e| Error::backend("recipient scan", e))?,
            email: row.get(2).map_err(|e| Error::backend("recipient scan", e))?,
        };
        match recipient_type.as_str() {
            "to" => to.push(address),
            "cc" => cc.push(address),
            "bcc" => bcc.push(address),
            // "from" is carried on the summary
            _ => {}
        }
    }
    Ok((to, cc, bcc))
}

fn load_attachments(
    conn: &Connection,
    cancel: &CancelToken,
    message_id: i64,
) -> Result<Vec<AttachmentInfo>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, message_id, filename, mime_type, size, content_hash \
             FROM attachments WHERE message_id = ? ORDER BY id",
        )
        .map_err(|e| Error::backend("attachment query", e))?;
    let mut rows = stmt
        .query([message_id])
        .map_err(|e| Error::backend("attachment query", e))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| Error::backend("attachment scan", e))? {
        cancel.check()?;
        out.push(
            attachment_from_row(row).map_err(|e| Error::backend("attachment scan", e))?,
        );
    }
    Ok(out)
}

fn attachment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttachmentInfo> {
    Ok(AttachmentInfo {
        id: row.get(0)?,
        message_id: row.get(1)?,
        filename: row.get(2)?,
        mime_type: row.get(3)?,
        size: row.get(4)?,
        content_hash: row.get(5)?,
    })
}

impl QueryEngine for SqliteEngine {
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
        let filter_sql = compile_filter(filter, Dialect::Sqlite)?;
        let (sql, args) = list_sql(
            Dialect::Sqlite,
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
        let compiled = self.compile_search(query, TextScope::MessageText);
        let (sql, args) = search_sql(Dialect::Sqlite, &compiled, limit, offset);
        self.query_summaries(cancel, "search query", &sql, &args)
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
        self.search(cancel, &merged, limit, offset)
    }

    fn search_fast_count(
        &self,
        cancel: &CancelToken,
        query: &Query,
        filter: &MessageFilter,
    ) -> Result<i64> {
        cancel.check()?;
        let merged = merge_filter_into_query(query, filter);
        let compiled = self.compile_search(&merged, TextScope::MessageText);
        let (sql, args) = search_count_sql(&compiled);

        let conn = self.conn.lock().unwrap();
        conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            .map_err(|e| Error::backend("count query", e))
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
        self.detail_where(cancel, "m.id = ?", SqlArg::Int(id))
    }

    fn get_message_by_source_id(
        &self,
        cancel: &CancelToken,
        source_id: &str,
    ) -> Result<Option<MessageDetail>> {
        self.detail_where(
            cancel,
            "m.source_message_id = ?",
            SqlArg::Text(source_id.to_string()),
        )
    }

    fn get_attachment(&self, cancel: &CancelToken, id: i64) -> Result<Option<AttachmentInfo>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, message_id, filename, mime_type, size, content_hash \
             FROM attachments WHERE id = ?",
            params![id],
            |row| attachment_from_row(row),
        )
        .optional()
        .map_err(|e| Error::backend("attachment lookup", e))
    }

    fn gmail_ids_by_filter(
        &self,
        cancel: &CancelToken,
        filter: &MessageFilter,
    ) -> Result<Vec<String>> {
        cancel.check()?;
        let filter_sql = compile_filter(filter, Dialect::Sqlite)?;
        let (sql, args) = gmail_ids_sql(
            Dialect::Sqlite,
            &filter_sql,
            filter.hide_deleted_from_source,
            filter.limit,
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::backend("id query", e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| Error::backend("id query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::backend("id scan", e))? {
            cancel.check()?;
            out.push(row.get(0).map_err(|e| Error::backend("id scan", e))?);
        }
        Ok(out)
    }

    fn list_accounts(&self, cancel: &CancelToken) -> Result<Vec<AccountInfo>> {
        cancel.check()?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(accounts_sql())
            .map_err(|e| Error::backend("account query", e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| Error::backend("account query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::backend("account scan", e))? {
            cancel.check()?;
            out.push(AccountInfo {
                id: row.get(0).map_err(|e| Error::backend("account scan", e))?,
                source_type: row.get(1).map_err(|e| Error::backend("account scan", e))?,
                identifier: row.get(2).map_err(|e| Error::backend("account scan", e))?,
                display_name: row.get(3).map_err(|e| Error::backend("account scan", e))?,
                message_count: row.get(4).map_err(|e| Error::backend("account scan", e))?,
                total_size: row.get(5).map_err(|e| Error::backend("account scan", e))?,
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
            Some(self.compile_search(&parsed, scope))
        };

        let ((message_sql, message_args), (attachment_sql, attachment_args)) = stats_sql(
            Dialect::Sqlite,
            opts.source_id,
            opts.with_attachments_only,
            compiled.as_ref(),
        );

        let conn = self.conn.lock().unwrap();
        let (message_count, total_size) = conn
            .query_row(&message_sql, params_from_iter(message_args.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|e| Error::backend("stats query", e))?;
        let (attachment_count, attachment_size) = conn
            .query_row(
                &attachment_sql,
                params_from_iter(attachment_args.iter()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::backend("stats query", e))?;

        Ok(TotalStats {
            message_count,
            total_size,
            attachment_count,
            attachment_size,
        })
    }
}
