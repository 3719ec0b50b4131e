//! Lowering of a parsed [`Query`] to SQL predicates
//!
//! Produces predicates on the `m` (messages) alias plus, for text terms
//! when full-text search is available, one join to the FTS virtual table.
//! User input only ever reaches the database through bound parameters, and
//! every LIKE pattern is escaped and terminated with `ESCAPE '\'`.

use crate::query::dialect::{Dialect, SqlArg};

use super::query::Query;

/// Where free-text terms are matched.
///
/// Stats queries that accompany a Recipients or Labels aggregate redirect
/// text terms at the dimension's key columns instead of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScope {
    /// Subject/snippet (or the FTS index when present)
    MessageText,
    /// Recipient email addresses
    RecipientKeys,
    /// Label names
    LabelKeys,
}

/// Compiled form of a [`Query`]: join fragments, AND-joined predicates, and
/// bound arguments in placeholder order.
#[derive(Debug, Default, Clone)]
pub struct CompiledQuery {
    pub joins: Vec<String>,
    pub conds: Vec<String>,
    pub args: Vec<SqlArg>,
}

/// Escape LIKE wildcards in user input.
///
/// Backslash, percent, and underscore are prefixed with a backslash; the
/// emitting fragment must carry `ESCAPE '\'`.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build a single FTS MATCH string from free-text terms.
///
/// Terms are joined with spaces; terms containing whitespace or quotes are
/// wrapped in double quotes with internal quotes doubled.
pub(crate) fn fts_match_expr(terms: &[String]) -> String {
    let mut parts = Vec::with_capacity(terms.len());
    for term in terms {
        if term.chars().any(|c| c.is_whitespace() || c == '"') {
            parts.push(format!("\"{}\"", term.replace('"', "\"\"")));
        } else {
            parts.push(term.clone());
        }
    }
    parts.join(" ")
}

/// Lower a parsed query into predicates on the `m` alias.
///
/// `fts_available` selects the text search path; only the row store ever
/// passes `true`.
pub(crate) fn compile_query(
    query: &Query,
    dialect: Dialect,
    fts_available: bool,
    scope: TextScope,
) -> CompiledQuery {
    let mut out = CompiledQuery::default();
    let like = dialect.ci_like();

    address_list(&mut out, &query.from_addrs, "mr_q.recipient_type = 'from'", true);
    address_list(&mut out, &query.to_addrs, "mr_q.recipient_type = 'to'", false);
    address_list(&mut out, &query.cc_addrs, "mr_q.recipient_type = 'cc'", false);
    address_list(&mut out, &query.bcc_addrs, "mr_q.recipient_type = 'bcc'", false);

    for label in &query.labels {
        out.conds.push(
            "EXISTS (SELECT 1 FROM message_labels ml_q \
             JOIN labels l_q ON l_q.id = ml_q.label_id \
             WHERE ml_q.message_id = m.id \
             AND LOWER(l_q.name) LIKE LOWER(?) ESCAPE '\\')"
                .to_string(),
        );
        out.args.push(SqlArg::Text(escape_like(label)));
    }

    for term in &query.subject_terms {
        out.conds.push(format!("m.subject {like} ? ESCAPE '\\'"));
        out.args.push(SqlArg::Text(format!("%{}%", escape_like(term))));
    }

    if !query.text_terms.is_empty() {
        match scope {
            TextScope::MessageText => {
                if fts_available {
                    out.joins
                        .push("JOIN messages_fts ON messages_fts.rowid = m.id".to_string());
                    out.conds.push("messages_fts MATCH ?".to_string());
                    out.args.push(SqlArg::Text(fts_match_expr(&query.text_terms)));
                } else {
                    for term in &query.text_terms {
                        out.conds.push(format!(
                            "(m.subject {like} ? ESCAPE '\\' OR m.snippet {like} ? ESCAPE '\\')"
                        ));
                        let pattern = format!("%{}%", escape_like(term));
                        out.args.push(SqlArg::Text(pattern.clone()));
                        out.args.push(SqlArg::Text(pattern));
                    }
                }
            }
            TextScope::RecipientKeys => {
                for term in &query.text_terms {
                    out.conds.push(
                        "EXISTS (SELECT 1 FROM message_recipients mr_q \
                         JOIN participants p_q ON p_q.id = mr_q.participant_id \
                         WHERE mr_q.message_id = m.id \
                         AND mr_q.recipient_type IN ('to', 'cc', 'bcc') \
                         AND LOWER(p_q.email_address) LIKE ? ESCAPE '\\')"
                            .to_string(),
                    );
                    out.args
                        .push(SqlArg::Text(format!("%{}%", escape_like(&term.to_lowercase()))));
                }
            }
            TextScope::LabelKeys => {
                for term in &query.text_terms {
                    out.conds.push(
                        "EXISTS (SELECT 1 FROM message_labels ml_q \
                         JOIN labels l_q ON l_q.id = ml_q.label_id \
                         WHERE ml_q.message_id = m.id \
                         AND LOWER(l_q.name) LIKE ? ESCAPE '\\')"
                            .to_string(),
                    );
                    out.args
                        .push(SqlArg::Text(format!("%{}%", escape_like(&term.to_lowercase()))));
                }
            }
        }
    }

    match query.has_attachment {
        Some(true) => out.conds.push(dialect.is_true("m.has_attachments")),
        Some(false) => out.conds.push(format!("NOT ({})", dialect.is_true("m.has_attachments"))),
        None => {}
    }

    if let Some(after) = query.after_date {
        out.conds.push(format!("m.sent_at >= {}", dialect.timestamp_param()));
        out.args.push(dialect.timestamp_arg(after));
    }
    if let Some(before) = query.before_date {
        out.conds.push(format!("m.sent_at < {}", dialect.timestamp_param()));
        out.args.push(dialect.timestamp_arg(before));
    }

    if let Some(larger) = query.larger_than {
        out.conds.push("m.size_estimate > ?".to_string());
        out.args.push(SqlArg::Int(larger));
    }
    if let Some(smaller) = query.smaller_than {
        out.conds.push("m.size_estimate < ?".to_string());
        out.args.push(SqlArg::Int(smaller));
    }

    if let Some(account_id) = query.account_id {
        out.conds.push("m.source_id = ?".to_string());
        out.args.push(SqlArg::Int(account_id));
    }

    if query.hide_deleted {
        out.conds.push("m.deleted_from_source_at IS NULL".to_string());
    }

    out
}

/// Lower one address list as an EXISTS over recipients of the right type.
///
/// Elements starting with `@` match the address suffix (`from:` lists only);
/// everything else matches the whole address, case-insensitively. Multiple
/// addresses in one list combine with OR inside the EXISTS.
fn address_list(out: &mut CompiledQuery, addrs: &[String], type_cond: &str, allow_domain: bool) {
    if addrs.is_empty() {
        return;
    }

    let mut alternatives = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if allow_domain && addr.starts_with('@') {
            alternatives.push("LOWER(p_q.email_address) LIKE ? ESCAPE '\\'".to_string());
            out.args
                .push(SqlArg::Text(format!("%{}", escape_like(&addr.to_lowercase()))));
        } else {
            alternatives.push("LOWER(p_q.email_address) = LOWER(?)".to_string());
            out.args.push(SqlArg::Text(addr.clone()));
        }
    }

    out.conds.push(format!(
        "EXISTS (SELECT 1 FROM message_recipients mr_q \
         JOIN participants p_q ON p_q.id = mr_q.participant_id \
         WHERE mr_q.message_id = m.id AND {type_cond} AND ({}))",
        alternatives.join(" OR ")
    ));
}

/// Search conditions for the Labels aggregate view.
///
/// On the Labels dimension the grouping column is filtered directly:
/// `label:` terms match whole names and free-text terms match substrings,
/// both case-insensitively. The returned residual query has those fields
/// stripped and lowers generically.
pub(crate) struct LabelViewSearch {
    pub conds: Vec<String>,
    pub args: Vec<SqlArg>,
    pub residual: Query,
}

pub(crate) fn split_label_view_query(query: &Query) -> LabelViewSearch {
    let mut conds = Vec::new();
    let mut args = Vec::new();

    for label in &query.labels {
        conds.push("LOWER(l.name) LIKE LOWER(?) ESCAPE '\\'".to_string());
        args.push(SqlArg::Text(escape_like(label)));
    }
    for term in &query.text_terms {
        conds.push("LOWER(l.name) LIKE ? ESCAPE '\\'".to_string());
        args.push(SqlArg::Text(format!("%{}%", escape_like(&term.to_lowercase()))));
    }

    let mut residual = query.clone();
    residual.labels = Vec::new();
    residual.text_terms = Vec::new();

    LabelViewSearch { conds, args, residual }
}
