//! Compilation of a [`MessageFilter`] into joins, predicates, and arguments
//!
//! Each optional join is emitted at most once under a deterministic alias so
//! later filter fields (e.g. `domain` after `sender`) reuse it instead of
//! duplicating rows. Empty-bucket drill-down targets swap the inner joins
//! for LEFT joins or NOT EXISTS subqueries.

use crate::error::{Error, Result};
use crate::models::{MessageFilter, TimeGranularity, ViewType};

use super::dialect::{Dialect, SqlArg};

/// Sender-side display name with address fallback, used for both filtering
/// and aggregation so drill-down keys round-trip.
pub(crate) fn display_name_expr(participants_alias: &str) -> String {
    format!(
        "COALESCE(NULLIF(TRIM({participants_alias}.display_name), ''), {participants_alias}.email_address)"
    )
}

/// Compiled form of a [`MessageFilter`].
#[derive(Debug, Default, Clone)]
pub struct FilterSql {
    pub joins: Vec<String>,
    pub conds: Vec<String>,
    pub args: Vec<SqlArg>,
}

impl FilterSql {
    /// Join fragment, newline-joined.
    pub fn join_clause(&self) -> String {
        self.joins.join("\n")
    }
}

/// Compile a filter against the `m` (messages) alias.
pub fn compile_filter(filter: &MessageFilter, dialect: Dialect) -> Result<FilterSql> {
    let mut out = FilterSql::default();
    let empty = &filter.match_empty;

    // Join plan. The from-sender pair serves sender, sender-name, and
    // domain filters plus the Senders/Domains empty buckets; the recipient
    // pair serves recipient and recipient-name filters plus the Recipients
    // empty bucket (which skips the participants join).
    let from_left = empty.contains(&ViewType::Senders) || empty.contains(&ViewType::Domains);
    let need_from = from_left
        || filter.sender.is_some()
        || filter.sender_name.is_some()
        || filter.domain.is_some();

    let to_left = empty.contains(&ViewType::Recipients);
    let need_to = to_left || filter.recipient.is_some() || filter.recipient_name.is_some();
    let need_to_participants = filter.recipient.is_some() || filter.recipient_name.is_some();

    if need_from {
        let kind = if from_left { "LEFT" } else { "INNER" };
        out.joins.push(format!(
            "{kind} JOIN message_recipients mr_filter_from \
             ON mr_filter_from.message_id = m.id \
             AND mr_filter_from.recipient_type = 'from'"
        ));
        out.joins.push(format!(
            "{kind} JOIN participants p_filter_from \
             ON p_filter_from.id = mr_filter_from.participant_id"
        ));
    }

    if need_to {
        let kind = if to_left { "LEFT" } else { "INNER" };
        out.joins.push(format!(
            "{kind} JOIN message_recipients mr_filter_to \
             ON mr_filter_to.message_id = m.id \
             AND mr_filter_to.recipient_type IN ('to', 'cc', 'bcc')"
        ));
        if need_to_participants {
            out.joins.push(format!(
                "{kind} JOIN participants p_filter_to \
                 ON p_filter_to.id = mr_filter_to.participant_id"
            ));
        }
    }

    if filter.label.is_some() {
        out.joins.push(
            "INNER JOIN message_labels ml_filter ON ml_filter.message_id = m.id".to_string(),
        );
        out.joins
            .push("INNER JOIN labels l_filter ON l_filter.id = ml_filter.label_id".to_string());
    }

    // Predicates, in field order.
    if let Some(source_id) = filter.source_id {
        out.conds.push("m.source_id = ?".to_string());
        out.args.push(SqlArg::Int(source_id));
    }
    if let Some(conversation_id) = filter.conversation_id {
        out.conds.push("m.conversation_id = ?".to_string());
        out.args.push(SqlArg::Int(conversation_id));
    }
    if let Some(after) = filter.after {
        out.conds.push(format!("m.sent_at >= {}", dialect.timestamp_param()));
        out.args.push(dialect.timestamp_arg(after));
    }
    if let Some(before) = filter.before {
        out.conds.push(format!("m.sent_at < {}", dialect.timestamp_param()));
        out.args.push(dialect.timestamp_arg(before));
    }
    if filter.with_attachments_only {
        out.conds.push(dialect.is_true("m.has_attachments"));
    }
    if filter.hide_deleted_from_source {
        out.conds.push("m.deleted_from_source_at IS NULL".to_string());
    }

    if let Some(sender) = &filter.sender {
        out.conds.push("p_filter_from.email_address = ?".to_string());
        out.args.push(SqlArg::Text(sender.clone()));
    }
    if let Some(sender_name) = &filter.sender_name {
        out.conds.push(format!("{} = ?", display_name_expr("p_filter_from")));
        out.args.push(SqlArg::Text(sender_name.clone()));
    }
    if let Some(recipient) = &filter.recipient {
        out.conds.push("p_filter_to.email_address = ?".to_string());
        out.args.push(SqlArg::Text(recipient.clone()));
    }
    if let Some(recipient_name) = &filter.recipient_name {
        out.conds.push(format!("{} = ?", display_name_expr("p_filter_to")));
        out.args.push(SqlArg::Text(recipient_name.clone()));
    }
    if let Some(domain) = &filter.domain {
        out.conds.push("p_filter_from.domain = ?".to_string());
        out.args.push(SqlArg::Text(domain.clone()));
    }
    if let Some(label) = &filter.label {
        out.conds.push("LOWER(l_filter.name) = LOWER(?)".to_string());
        out.args.push(SqlArg::Text(label.clone()));
    }
    if let Some(period) = &filter.time_period {
        let granularity = TimeGranularity::from_period(period).ok_or_else(|| {
            Error::validation(format!("invalid time period: {period:?}"))
        })?;
        out.conds
            .push(format!("{} = ?", dialect.time_bucket("m.sent_at", granularity)));
        out.args.push(SqlArg::Text(period.clone()));
    }

    // Empty-bucket drill-down; multiple targets combine with AND.
    for target in empty {
        match target {
            ViewType::Senders => {
                out.conds.push(
                    "(mr_filter_from.message_id IS NULL \
                     OR p_filter_from.email_address IS NULL \
                     OR p_filter_from.email_address = '')"
                        .to_string(),
                );
            }
            ViewType::SenderNames => {
                out.conds.push(format!(
                    "NOT EXISTS (SELECT 1 FROM message_recipients mr_ne \
                     JOIN participants p_ne ON p_ne.id = mr_ne.participant_id \
                     WHERE mr_ne.message_id = m.id \
                     AND mr_ne.recipient_type = 'from' \
                     AND {} IS NOT NULL)",
                    display_name_expr("p_ne")
                ));
            }
            ViewType::Recipients => {
                out.conds.push("mr_filter_to.message_id IS NULL".to_string());
            }
            ViewType::RecipientNames => {
                out.conds.push(format!(
                    "NOT EXISTS (SELECT 1 FROM message_recipients mr_ne \
                     JOIN participants p_ne ON p_ne.id = mr_ne.participant_id \
                     WHERE mr_ne.message_id = m.id \
                     AND mr_ne.recipient_type IN ('to', 'cc', 'bcc') \
                     AND {} IS NOT NULL)",
                    display_name_expr("p_ne")
                ));
            }
            ViewType::Domains => {
                out.conds.push(
                    "(p_filter_from.domain IS NULL OR p_filter_from.domain = '')".to_string(),
                );
            }
            ViewType::Labels => {
                out.conds.push(
                    "NOT EXISTS (SELECT 1 FROM message_labels ml_ne \
                     WHERE ml_ne.message_id = m.id)"
                        .to_string(),
                );
            }
            // The time dimension has no empty bucket: sent_at is NOT NULL.
            ViewType::Time => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn joins_named(sql: &FilterSql, alias: &str) -> usize {
        sql.joins.iter().filter(|j| j.contains(alias)).count()
    }

    #[test]
    fn test_empty_filter_compiles_to_nothing() {
        let sql = compile_filter(&MessageFilter::default(), Dialect::Sqlite).unwrap();
        assert!(sql.joins.is_empty());
        assert!(sql.conds.is_empty());
        assert!(sql.args.is_empty());
    }

    #[test]
    fn test_sender_and_domain_share_one_join_pair() {
        let filter = MessageFilter {
            sender: Some("alice@example.com".to_string()),
            domain: Some("example.com".to_string()),
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(joins_named(&sql, "mr_filter_from"), 1);
        assert_eq!(joins_named(&sql, "p_filter_from"), 1);
        assert!(sql.conds.contains(&"p_filter_from.email_address = ?".to_string()));
        assert!(sql.conds.contains(&"p_filter_from.domain = ?".to_string()));
        assert_eq!(sql.args.len(), 2);
    }

    #[test]
    fn test_sender_name_reuses_sender_join() {
        let filter = MessageFilter {
            sender: Some("alice@example.com".to_string()),
            sender_name: Some("Alice".to_string()),
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(joins_named(&sql, "mr_filter_from"), 1);
        assert!(sql.conds.iter().any(|c| c.contains("COALESCE(NULLIF(TRIM(")));
    }

    #[test]
    fn test_recipient_joins_scoped_to_to_cc_bcc() {
        let filter = MessageFilter {
            recipient: Some("bob@company.org".to_string()),
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert!(sql.joins[0].contains("recipient_type IN ('to', 'cc', 'bcc')"));
        assert!(sql.joins[0].starts_with("INNER JOIN"));
    }

    #[test]
    fn test_empty_senders_target_uses_left_join() {
        let filter = MessageFilter::match_empty(ViewType::Senders);
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert!(sql.joins[0].starts_with("LEFT JOIN message_recipients mr_filter_from"));
        assert!(sql.joins[1].starts_with("LEFT JOIN participants p_filter_from"));
        assert_eq!(sql.conds.len(), 1);
        assert!(sql.conds[0].contains("mr_filter_from.message_id IS NULL"));
        assert!(sql.conds[0].contains("email_address = ''"));
    }

    #[test]
    fn test_empty_recipients_target_skips_participants_join() {
        let filter = MessageFilter::match_empty(ViewType::Recipients);
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(sql.joins.len(), 1);
        assert!(sql.joins[0].starts_with("LEFT JOIN message_recipients mr_filter_to"));
        assert_eq!(sql.conds, vec!["mr_filter_to.message_id IS NULL"]);
    }

    #[test]
    fn test_recipient_name_with_empty_target_adds_participants_back() {
        let mut filter = MessageFilter::match_empty(ViewType::Recipients);
        filter.recipient_name = Some("Bob".to_string());
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(joins_named(&sql, "p_filter_to"), 1);
        assert!(sql.joins.iter().all(|j| j.starts_with("LEFT JOIN")));
        // Contradictory but legal; both predicates are present.
        assert_eq!(sql.conds.len(), 2);
    }

    #[test]
    fn test_empty_labels_target_is_not_exists() {
        let filter = MessageFilter::match_empty(ViewType::Labels);
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert!(sql.joins.is_empty());
        assert!(sql.conds[0].starts_with("NOT EXISTS"));
    }

    #[test]
    fn test_multiple_empty_targets_and_together() {
        let mut targets = BTreeSet::new();
        targets.insert(ViewType::Senders);
        targets.insert(ViewType::Labels);
        let filter = MessageFilter {
            match_empty: targets,
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(sql.conds.len(), 2);
    }

    #[test]
    fn test_time_period_infers_granularity() {
        for (period, expected) in [
            ("2024", "strftime('%Y', m.sent_at) = ?"),
            ("2024-01", "strftime('%Y-%m', m.sent_at) = ?"),
            ("2024-01-15", "strftime('%Y-%m-%d', m.sent_at) = ?"),
        ] {
            let filter = MessageFilter {
                time_period: Some(period.to_string()),
                ..Default::default()
            };
            let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
            assert_eq!(sql.conds, vec![expected.to_string()]);
        }
    }

    #[test]
    fn test_invalid_time_period_is_validation_error() {
        let filter = MessageFilter {
            time_period: Some("202".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            compile_filter(&filter, Dialect::Sqlite),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_date_range_is_half_open() {
        let filter = MessageFilter {
            after: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            before: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        assert_eq!(sql.conds, vec!["m.sent_at >= ?", "m.sent_at < ?"]);

        let duck = compile_filter(&filter, Dialect::DuckDb).unwrap();
        assert_eq!(
            duck.conds,
            vec![
                "m.sent_at >= CAST(? AS TIMESTAMP)",
                "m.sent_at < CAST(? AS TIMESTAMP)"
            ]
        );
    }

    #[test]
    fn test_all_values_bound_as_parameters() {
        let filter = MessageFilter {
            sender: Some("'; DROP TABLE messages; --".to_string()),
            label: Some("Work".to_string()),
            ..Default::default()
        };
        let sql = compile_filter(&filter, Dialect::Sqlite).unwrap();
        for cond in &sql.conds {
            assert!(!cond.contains("DROP TABLE"), "user data leaked into SQL: {cond}");
        }
        assert_eq!(sql.args.len(), 2);
    }
}
