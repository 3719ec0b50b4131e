//! SQL skeletons for list, search, id-enumeration, and stats queries
//!
//! Both engines execute the same statements; dialect differences are
//! confined to timestamp projection and parameters. Row mapping stays in
//! the engines since the two backends expose different row types.

use crate::models::{MessageSortField, SortDirection};
use crate::search::sql::CompiledQuery;

use super::dialect::{Dialect, SqlArg};
use super::filter_sql::FilterSql;

/// Default row limit for `list_messages`.
pub const DEFAULT_LIST_LIMIT: i64 = 500;
/// Default row limit for `search`.
pub const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Projected columns for a message summary, aliased so ORDER BY can refer
/// to output columns (required under SELECT DISTINCT) and so timestamps
/// come back as RFC 3339 text on both backends.
fn summary_projection(dialect: Dialect) -> String {
    format!(
        "m.id AS id, m.source_id AS source_id, m.conversation_id AS conversation_id, \
         m.source_message_id AS gmail_id, c.source_conversation_id AS thread_id, \
         m.subject AS subject, m.snippet AS snippet, \
         {sent} AS sent_at, {received} AS received_at, \
         m.size_estimate AS size_estimate, m.has_attachments AS has_attachments, \
         m.attachment_count AS attachment_count, {deleted} AS deleted_at, \
         p_from.email_address AS from_email, \
         COALESCE(NULLIF(TRIM(mr_from.display_name), ''), p_from.display_name) AS from_name",
        sent = dialect.timestamp_text("m.sent_at"),
        received = dialect.timestamp_text("m.received_at"),
        deleted = dialect.timestamp_text("m.deleted_from_source_at"),
    )
}

/// Joins every summary query carries: displayed sender and thread id.
fn summary_joins() -> &'static str {
    "LEFT JOIN message_recipients mr_from ON mr_from.message_id = m.id \
     AND mr_from.recipient_type = 'from'\n\
     LEFT JOIN participants p_from ON p_from.id = mr_from.participant_id\n\
     LEFT JOIN conversations c ON c.id = m.conversation_id"
}

fn where_clause(conds: &[String]) -> String {
    if conds.is_empty() {
        String::new()
    } else {
        format!("WHERE {}\n", conds.join(" AND "))
    }
}

fn list_order_column(field: MessageSortField) -> &'static str {
    match field {
        MessageSortField::Date => "sent_at",
        MessageSortField::Size => "size_estimate",
        MessageSortField::Subject => "subject",
    }
}

/// `list_messages` skeleton; filter joins/conditions plus paging.
pub(crate) fn list_sql(
    dialect: Dialect,
    filter: &FilterSql,
    sort_by: MessageSortField,
    sort_dir: SortDirection,
    limit: i64,
    offset: i64,
) -> (String, Vec<SqlArg>) {
    let mut args = filter.args.clone();
    let limit = if limit > 0 { limit } else { DEFAULT_LIST_LIMIT };
    args.push(SqlArg::Int(limit));
    args.push(SqlArg::Int(offset));

    let sql = format!(
        "SELECT DISTINCT {projection}\n\
         FROM messages m\n\
         {base_joins}\n\
         {filter_joins}\
         {where_clause}\
         ORDER BY {order} {dir}, id DESC\n\
         LIMIT ? OFFSET ?",
        projection = summary_projection(dialect),
        base_joins = summary_joins(),
        filter_joins = joins_block(&filter.joins),
        where_clause = where_clause(&filter.conds),
        order = list_order_column(sort_by),
        dir = sort_dir.as_sql(),
    );

    (sql, args)
}

/// `search` skeleton over a compiled query; newest first.
pub(crate) fn search_sql(
    dialect: Dialect,
    compiled: &CompiledQuery,
    limit: i64,
    offset: i64,
) -> (String, Vec<SqlArg>) {
    let mut args = compiled.args.clone();
    let limit = if limit > 0 { limit } else { DEFAULT_SEARCH_LIMIT };
    args.push(SqlArg::Int(limit));
    args.push(SqlArg::Int(offset));

    let sql = format!(
        "SELECT DISTINCT {projection}\n\
         FROM messages m\n\
         {base_joins}\n\
         {search_joins}\
         {where_clause}\
         ORDER BY sent_at DESC, id DESC\n\
         LIMIT ? OFFSET ?",
        projection = summary_projection(dialect),
        base_joins = summary_joins(),
        search_joins = joins_block(&compiled.joins),
        where_clause = where_clause(&compiled.conds),
    );

    (sql, args)
}

/// Fast count reusing the search predicate skeleton.
pub(crate) fn search_count_sql(compiled: &CompiledQuery) -> (String, Vec<SqlArg>) {
    let sql = format!(
        "SELECT COUNT(DISTINCT m.id)\n\
         FROM messages m\n\
         {search_joins}\
         {where_clause}",
        search_joins = joins_block(&compiled.joins),
        where_clause = where_clause(&compiled.conds),
    );
    (sql, compiled.args.clone())
}

/// Source-message-id enumeration for re-sync flows. Always excludes
/// messages deleted from the source; no limit unless requested.
pub(crate) fn gmail_ids_sql(
    dialect: Dialect,
    filter: &FilterSql,
    hide_deleted_in_filter: bool,
    limit: i64,
) -> (String, Vec<SqlArg>) {
    let mut conds = filter.conds.clone();
    if !hide_deleted_in_filter {
        conds.push("m.deleted_from_source_at IS NULL".to_string());
    }

    let mut args = filter.args.clone();
    let limit_clause = if limit > 0 {
        args.push(SqlArg::Int(limit));
        "\nLIMIT ?"
    } else {
        ""
    };

    let sql = format!(
        "SELECT DISTINCT m.source_message_id AS gmail_id, {sent} AS sent_at, m.id AS id\n\
         FROM messages m\n\
         {filter_joins}\
         {where_clause}\
         ORDER BY sent_at DESC, id DESC{limit_clause}",
        sent = dialect.timestamp_text("m.sent_at"),
        filter_joins = joins_block(&filter.joins),
        where_clause = where_clause(&conds),
    );

    (sql, args)
}

/// Batch label fetch for a page of message ids.
pub(crate) fn labels_batch_sql(id_count: usize) -> String {
    let placeholders = vec!["?"; id_count].join(", ");
    format!(
        "SELECT ml.message_id, l.name\n\
         FROM message_labels ml\n\
         JOIN labels l ON l.id = ml.label_id\n\
         WHERE ml.message_id IN ({placeholders})\n\
         ORDER BY ml.message_id, l.name"
    )
}

/// Account listing with per-source totals.
pub(crate) fn accounts_sql() -> &'static str {
    "SELECT s.id, s.source_type, s.identifier, s.display_name, \
     COUNT(m.id) AS message_count, \
     CAST(COALESCE(SUM(m.size_estimate), 0) AS BIGINT) AS total_size\n\
     FROM sources s\n\
     LEFT JOIN messages m ON m.source_id = s.id\n\
     GROUP BY s.id, s.source_type, s.identifier, s.display_name\n\
     ORDER BY s.id"
}

/// Total-stats queries: one over messages, one over attachments.
///
/// When a search restricts the totals its joins can multiply rows, so both
/// queries scope through `m.id IN (SELECT DISTINCT m.id ...)` instead of
/// joining the search fragments directly.
pub(crate) fn stats_sql(
    dialect: Dialect,
    source_id: Option<i64>,
    with_attachments_only: bool,
    search: Option<&CompiledQuery>,
) -> ((String, Vec<SqlArg>), (String, Vec<SqlArg>)) {
    let mut conds: Vec<String> = Vec::new();
    let mut args: Vec<SqlArg> = Vec::new();

    if let Some(source_id) = source_id {
        conds.push("m.source_id = ?".to_string());
        args.push(SqlArg::Int(source_id));
    }
    if with_attachments_only {
        conds.push(dialect.is_true("m.has_attachments"));
    }
    if let Some(search) = search {
        conds.push(format!(
            "m.id IN (SELECT DISTINCT m.id FROM messages m\n{}{})",
            joins_block(&search.joins),
            if search.conds.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", search.conds.join(" AND "))
            }
        ));
        args.extend(search.args.iter().cloned());
    }

    let message_sql = format!(
        "SELECT COUNT(*), CAST(COALESCE(SUM(m.size_estimate), 0) AS BIGINT)\n\
         FROM messages m\n\
         {}",
        where_clause(&conds)
    );

    let attachment_sql = format!(
        "SELECT COUNT(*), CAST(COALESCE(SUM(a.size), 0) AS BIGINT)\n\
         FROM attachments a\n\
         JOIN messages m ON m.id = a.message_id\n\
         {}",
        where_clause(&conds)
    );

    ((message_sql, args.clone()), (attachment_sql, args))
}

fn joins_block(joins: &[String]) -> String {
    if joins.is_empty() {
        String::new()
    } else {
        format!("{}\n", joins.join("\n"))
    }
}
