//! Aggregation dimensions and the aggregate SQL template
//!
//! Every [`ViewType`] maps to a key expression, the joins that expose it,
//! and a dimension predicate excluding rows where the key is absent (those
//! rows form the dimension's empty bucket, reachable through
//! [`MessageFilter::match_empty`](crate::models::MessageFilter::match_empty)).

use crate::models::{AggregateOptions, SortField, TimeGranularity, ViewType};
use crate::search::sql::CompiledQuery;

use super::dialect::{Dialect, SqlArg};
use super::filter_sql::{FilterSql, display_name_expr};

/// Default bucket limit when `AggregateOptions.limit == 0`.
pub const DEFAULT_AGGREGATE_LIMIT: i64 = 100;

/// One aggregation dimension: grouping key, joins, and key-presence filter.
#[derive(Debug, Clone)]
pub struct AggDimension {
    pub key_expr: String,
    pub joins: Vec<String>,
    pub where_cond: Option<String>,
}

fn from_recipient_joins() -> Vec<String> {
    vec![
        "INNER JOIN message_recipients mr ON mr.message_id = m.id \
         AND mr.recipient_type = 'from'"
            .to_string(),
        "INNER JOIN participants p ON p.id = mr.participant_id".to_string(),
    ]
}

fn to_recipient_joins() -> Vec<String> {
    vec![
        "INNER JOIN message_recipients mr ON mr.message_id = m.id \
         AND mr.recipient_type IN ('to', 'cc', 'bcc')"
            .to_string(),
        "INNER JOIN participants p ON p.id = mr.participant_id".to_string(),
    ]
}

/// Build the dimension descriptor for a view.
pub fn dimension(view: ViewType, dialect: Dialect, granularity: TimeGranularity) -> AggDimension {
    match view {
        ViewType::Senders => AggDimension {
            key_expr: "p.email_address".to_string(),
            joins: from_recipient_joins(),
            where_cond: Some("p.email_address IS NOT NULL".to_string()),
        },
        ViewType::SenderNames => AggDimension {
            key_expr: display_name_expr("p"),
            joins: from_recipient_joins(),
            where_cond: Some(format!("{} IS NOT NULL", display_name_expr("p"))),
        },
        ViewType::Recipients => AggDimension {
            key_expr: "p.email_address".to_string(),
            joins: to_recipient_joins(),
            where_cond: Some("p.email_address IS NOT NULL".to_string()),
        },
        ViewType::RecipientNames => AggDimension {
            key_expr: display_name_expr("p"),
            joins: to_recipient_joins(),
            where_cond: Some(format!("{} IS NOT NULL", display_name_expr("p"))),
        },
        ViewType::Domains => AggDimension {
            key_expr: "p.domain".to_string(),
            joins: from_recipient_joins(),
            where_cond: Some("p.domain IS NOT NULL AND p.domain <> ''".to_string()),
        },
        ViewType::Labels => AggDimension {
            key_expr: "l.name".to_string(),
            joins: vec![
                "INNER JOIN message_labels ml ON ml.message_id = m.id".to_string(),
                "INNER JOIN labels l ON l.id = ml.label_id".to_string(),
            ],
            where_cond: None,
        },
        ViewType::Time => AggDimension {
            key_expr: dialect.time_bucket("m.sent_at", granularity),
            joins: Vec::new(),
            where_cond: Some("m.sent_at IS NOT NULL".to_string()),
        },
    }
}

/// Assemble the aggregate query.
///
/// WHERE order is filter, search, label-key conditions, then the dimension
/// predicate; the argument list mirrors placeholder order with the limit
/// last. The secondary sort is always `key ASC` so ties are deterministic.
pub(crate) fn aggregate_sql(
    dialect: Dialect,
    view: ViewType,
    opts: &AggregateOptions,
    filter: &FilterSql,
    search: Option<&CompiledQuery>,
    label_conds: &[String],
    label_args: &[SqlArg],
) -> (String, Vec<SqlArg>) {
    let dim = dimension(view, dialect, opts.granularity);

    let mut joins = dim.joins.clone();
    joins.extend(filter.joins.iter().cloned());
    if let Some(search) = search {
        joins.extend(search.joins.iter().cloned());
    }

    let mut conds = filter.conds.clone();
    let mut args = filter.args.clone();
    if let Some(search) = search {
        conds.extend(search.conds.iter().cloned());
        args.extend(search.args.iter().cloned());
    }
    conds.extend(label_conds.iter().cloned());
    args.extend(label_args.iter().cloned());
    if let Some(dim_where) = &dim.where_cond {
        conds.push(dim_where.clone());
    }

    let where_clause = if conds.is_empty() {
        String::new()
    } else {
        format!("WHERE {}\n", conds.join(" AND "))
    };

    let sort_expr = match opts.sort_by {
        SortField::Count => "count",
        SortField::Size => "total_size",
        SortField::AttachmentSize => "attachment_size",
        SortField::Name => "key",
    };
    let order_clause = if sort_expr == "key" {
        format!("ORDER BY key {}", opts.sort_dir.as_sql())
    } else {
        format!("ORDER BY {sort_expr} {}, key ASC", opts.sort_dir.as_sql())
    };

    let limit = if opts.limit > 0 {
        opts.limit
    } else {
        DEFAULT_AGGREGATE_LIMIT
    };
    args.push(SqlArg::Int(limit));

    let sql = format!(
        "SELECT key, count, total_size, attachment_size, attachment_count, total_unique\n\
         FROM (\n\
         SELECT {key} AS key,\n\
         COUNT(*) AS count,\n\
         CAST(COALESCE(SUM(m.size_estimate), 0) AS BIGINT) AS total_size,\n\
         CAST(COALESCE(SUM(att.att_size), 0) AS BIGINT) AS attachment_size,\n\
         CAST(COALESCE(SUM(att.att_count), 0) AS BIGINT) AS attachment_count,\n\
         COUNT(*) OVER () AS total_unique\n\
         FROM messages m\n\
         {joins}\
         LEFT JOIN (SELECT message_id, SUM(size) AS att_size, COUNT(*) AS att_count \
         FROM attachments GROUP BY message_id) att ON att.message_id = m.id\n\
         {where_clause}\
         GROUP BY key\n\
         )\n\
         {order_clause}\n\
         LIMIT ?",
        key = dim.key_expr,
        joins = if joins.is_empty() {
            String::new()
        } else {
            format!("{}\n", joins.join("\n"))
        },
    );

    (sql, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageFilter, SortDirection};
    use crate::query::filter_sql::compile_filter;

    fn agg(view: ViewType, opts: &AggregateOptions) -> (String, Vec<SqlArg>) {
        let filter = compile_filter(&MessageFilter::default(), Dialect::Sqlite).unwrap();
        aggregate_sql(Dialect::Sqlite, view, opts, &filter, None, &[], &[])
    }

    #[test]
    fn test_default_limit_is_100() {
        let (sql, args) = agg(ViewType::Senders, &AggregateOptions::default());
        assert!(sql.ends_with("LIMIT ?"));
        assert_eq!(args.last(), Some(&SqlArg::Int(100)));
    }

    #[test]
    fn test_sort_has_key_tiebreak() {
        let (sql, _) = agg(ViewType::Senders, &AggregateOptions::default());
        assert!(sql.contains("ORDER BY count DESC, key ASC"));

        let by_name = AggregateOptions {
            sort_by: SortField::Name,
            sort_dir: SortDirection::Asc,
            ..Default::default()
        };
        let (sql, _) = agg(ViewType::Senders, &by_name);
        assert!(sql.contains("ORDER BY key ASC"));
        assert!(!sql.contains("key ASC, key ASC"));
    }

    #[test]
    fn test_dimension_where_excludes_null_keys() {
        let (sql, _) = agg(ViewType::Senders, &AggregateOptions::default());
        assert!(sql.contains("WHERE p.email_address IS NOT NULL"));

        let (sql, _) = agg(ViewType::Domains, &AggregateOptions::default());
        assert!(sql.contains("p.domain IS NOT NULL AND p.domain <> ''"));

        // Labels has no dimension predicate
        let (sql, _) = agg(ViewType::Labels, &AggregateOptions::default());
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_time_dimension_respects_granularity_and_dialect() {
        let opts = AggregateOptions {
            granularity: TimeGranularity::Year,
            ..Default::default()
        };
        let (sql, _) = agg(ViewType::Time, &opts);
        assert!(sql.contains("strftime('%Y', m.sent_at) AS key"));

        let filter = compile_filter(&MessageFilter::default(), Dialect::DuckDb).unwrap();
        let (sql, _) =
            aggregate_sql(Dialect::DuckDb, ViewType::Time, &opts, &filter, None, &[], &[]);
        assert!(sql.contains("strftime(m.sent_at, '%Y') AS key"));
    }

    #[test]
    fn test_filter_joins_appended_after_dimension_joins() {
        let filter = compile_filter(
            &MessageFilter {
                label: Some("Work".to_string()),
                ..Default::default()
            },
            Dialect::Sqlite,
        )
        .unwrap();
        let (sql, args) = aggregate_sql(
            Dialect::Sqlite,
            ViewType::Senders,
            &AggregateOptions::default(),
            &filter,
            None,
            &[],
            &[],
        );
        let dim_pos = sql.find("mr.recipient_type = 'from'").unwrap();
        let filter_pos = sql.find("ml_filter").unwrap();
        assert!(dim_pos < filter_pos);
        // label arg then limit
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_window_total_counts_groups() {
        let (sql, _) = agg(ViewType::Senders, &AggregateOptions::default());
        assert!(sql.contains("COUNT(*) OVER () AS total_unique"));
        assert!(sql.contains("GROUP BY key"));
    }
}
