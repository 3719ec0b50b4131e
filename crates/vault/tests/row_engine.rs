//! End-to-end behavior of the row-store engine over the standard corpus

mod common;

use common::*;
use vault::models::Address;
use vault::search::Query;
use vault::storage::{NewMessage, StoreWriter};
use vault::{
    AggregateOptions, MessageFilter, QueryEngine, SortDirection, SortField, SqliteEngine,
    StatsOptions, TimeGranularity, ViewType, parse_query,
};

fn text_query(terms: &[&str]) -> Query {
    Query {
        text_terms: terms.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn test_search_hello_returns_both_hello_messages() {
    for with_fts in [true, false] {
        let engine = row_engine(with_fts);
        let hits = engine.search(&cancel(), &text_query(&["Hello"]), 100, 0).unwrap();
        let mut ids = gmail_ids(&hits);
        ids.sort();
        assert_eq!(ids, vec!["msg1", "msg2"], "with_fts = {with_fts}");
    }
}

#[test]
fn test_search_from_alice() {
    let engine = row_engine(true);
    let query = Query {
        from_addrs: vec![ALICE.to_string()],
        ..Default::default()
    };
    let hits = engine.search(&cancel(), &query, 100, 0).unwrap();
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert_eq!(hit.from_email.as_deref(), Some(ALICE));
    }
}

#[test]
fn test_search_has_attachment() {
    let engine = row_engine(true);
    let query = Query {
        has_attachment: Some(true),
        ..Default::default()
    };
    let hits = engine.search(&cancel(), &query, 100, 0).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.has_attachments));
}

#[test]
fn test_aggregate_sender_counts() {
    let engine = row_engine(true);
    let rows = engine
        .aggregate(&cancel(), ViewType::Senders, &AggregateOptions::default())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key, ALICE);
    assert_eq!(rows[0].count, 3);
    assert_eq!(rows[1].key, BOB);
    assert_eq!(rows[1].count, 2);
    // Window count reports distinct keys before the limit
    assert!(rows.iter().all(|r| r.total_unique == 2));
}

#[test]
fn test_sub_aggregate_recipients_includes_cc() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        sender: Some(ALICE.to_string()),
        ..Default::default()
    };
    let rows = engine
        .sub_aggregate(&cancel(), &filter, ViewType::Recipients, &AggregateOptions::default())
        .unwrap();
    let dan = rows.iter().find(|r| r.key == DAN).expect("cc recipient missing");
    assert_eq!(dan.count, 1);
    let bob = rows.iter().find(|r| r.key == BOB).unwrap();
    assert_eq!(bob.count, 3);
}

#[test]
fn test_label_search_on_labels_view() {
    let engine = row_engine(true);
    let opts = AggregateOptions {
        search_query: "work".to_string(),
        ..Default::default()
    };
    let rows = engine.aggregate(&cancel(), ViewType::Labels, &opts).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, "Work");
    assert_eq!(rows[0].count, 2);
}

#[test]
fn test_empty_bucket_drilldown_senders() {
    let engine = row_engine(true);
    let filter = MessageFilter::match_empty(ViewType::Senders);
    let hits = engine.list_messages(&cancel(), &filter).unwrap();
    assert_eq!(gmail_ids(&hits), vec!["msg6"]);
}

#[test]
fn test_empty_bucket_drilldown_labels() {
    let engine = row_engine(true);
    let filter = MessageFilter::match_empty(ViewType::Labels);
    let hits = engine.list_messages(&cancel(), &filter).unwrap();
    assert_eq!(gmail_ids(&hits), vec!["msg6"]);
}

#[test]
fn test_empty_bucket_matches_aggregate_remainder() {
    // Messages outside every sender bucket are exactly the empty-bucket list
    let engine = row_engine(true);
    let rows = engine
        .aggregate(&cancel(), ViewType::Senders, &AggregateOptions::default())
        .unwrap();
    let bucketed: i64 = rows.iter().map(|r| r.count).sum();
    let total = engine
        .list_messages(&cancel(), &MessageFilter::default())
        .unwrap()
        .len() as i64;
    let empty = engine
        .list_messages(&cancel(), &MessageFilter::match_empty(ViewType::Senders))
        .unwrap()
        .len() as i64;
    assert_eq!(total - bucketed, empty);
}

#[test]
fn test_injection_attempt_is_inert() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        sender: Some("'; DROP TABLE messages; --".to_string()),
        ..Default::default()
    };
    let hits = engine.list_messages(&cancel(), &filter).unwrap();
    assert!(hits.is_empty());

    // Table intact
    let all = engine.list_messages(&cancel(), &MessageFilter::default()).unwrap();
    assert_eq!(all.len(), 6);
}

#[test]
fn test_date_range_half_open() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        after: Some(ts(2024, 2, 1, 0, 0)),
        before: Some(ts(2024, 3, 1, 0, 0)),
        ..Default::default()
    };
    let hits = engine.list_messages(&cancel(), &filter).unwrap();
    let mut ids = gmail_ids(&hits);
    ids.sort();
    assert_eq!(ids, vec!["msg3", "msg4"]);
}

#[test]
fn test_list_has_no_duplicate_ids() {
    // A recipient appearing in both to and cc must not duplicate the row
    let mut writer = StoreWriter::open_in_memory().unwrap();
    let source = writer.add_source("gmail", "me@example.com", None).unwrap();
    let mut message = NewMessage::new(source, "dup1", ts(2024, 1, 1, 0, 0));
    message.to = vec![Address::new(BOB)];
    message.cc = vec![Address::new(BOB)];
    writer.add_message(&message).unwrap();
    let engine = SqliteEngine::from_connection(writer.into_connection());

    let filter = MessageFilter {
        recipient: Some(BOB.to_string()),
        ..Default::default()
    };
    let hits = engine.list_messages(&cancel(), &filter).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_search_matches_fast_count() {
    let engine = row_engine(true);
    let queries = vec![
        text_query(&["Hello"]),
        Query {
            from_addrs: vec![ALICE.to_string()],
            ..Default::default()
        },
        Query {
            has_attachment: Some(true),
            ..Default::default()
        },
        Query::default(),
    ];
    for query in queries {
        let found = engine.search(&cancel(), &query, 10_000, 0).unwrap();
        let counted = engine
            .search_fast_count(&cancel(), &query, &MessageFilter::default())
            .unwrap();
        assert_eq!(found.len() as i64, counted, "query: {query:?}");
    }
}

#[test]
fn test_aggregate_ties_break_by_key() {
    let engine = row_engine(true);
    let rows = engine
        .aggregate(&cancel(), ViewType::Recipients, &AggregateOptions::default())
        .unwrap();
    // carol and dan both have count 1; carol sorts first
    let tail: Vec<&str> = rows
        .iter()
        .filter(|r| r.count == 1)
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(tail, vec![CAROL, DAN]);
}

#[test]
fn test_wildcards_in_filters_are_literal() {
    let engine = row_engine(true);
    for sender in ["%", "_lice@example.com", "%example.com"] {
        let filter = MessageFilter {
            sender: Some(sender.to_string()),
            ..Default::default()
        };
        assert!(
            engine.list_messages(&cancel(), &filter).unwrap().is_empty(),
            "wildcard {sender:?} matched"
        );
    }
}

#[test]
fn test_case_insensitive_text_search_without_fts() {
    let engine = row_engine(false);
    let baseline = gmail_ids(&engine.search(&cancel(), &text_query(&["hello"]), 100, 0).unwrap());
    assert!(!baseline.is_empty());
    for casing in ["HELLO", "HeLLo"] {
        let hits = engine.search(&cancel(), &text_query(&[casing]), 100, 0).unwrap();
        assert_eq!(gmail_ids(&hits), baseline, "casing {casing}");
    }
}

#[test]
fn test_deleted_messages_stay_visible() {
    let mut writer = StoreWriter::open_in_memory().unwrap();
    let source = writer.add_source("gmail", "me@example.com", None).unwrap();
    let mut kept = NewMessage::new(source, "kept", ts(2024, 1, 1, 0, 0));
    kept.from = Some(Address::new(ALICE));
    writer.add_message(&kept).unwrap();
    let mut deleted = NewMessage::new(source, "gone", ts(2024, 1, 2, 0, 0));
    deleted.from = Some(Address::new(ALICE));
    deleted.deleted_from_source_at = Some(ts(2024, 6, 1, 0, 0));
    writer.add_message(&deleted).unwrap();
    let engine = SqliteEngine::from_connection(writer.into_connection());

    // Visible in lists, aggregates, and detail
    let all = engine.list_messages(&cancel(), &MessageFilter::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|m| m.deleted_from_source));

    let senders = engine
        .aggregate(&cancel(), ViewType::Senders, &AggregateOptions::default())
        .unwrap();
    assert_eq!(senders[0].count, 2);

    let detail = engine
        .get_message_by_source_id(&cancel(), "gone")
        .unwrap()
        .expect("deleted message detail");
    assert!(detail.summary.deleted_from_source);

    // Hidden only on request
    let filter = MessageFilter {
        hide_deleted_from_source: true,
        ..Default::default()
    };
    assert_eq!(engine.list_messages(&cancel(), &filter).unwrap().len(), 1);

    // Id enumeration always skips deleted
    let ids = engine
        .gmail_ids_by_filter(&cancel(), &MessageFilter::default())
        .unwrap();
    assert_eq!(ids, vec!["kept"]);
}

#[test]
fn test_gmail_ids_order_and_limit() {
    let engine = row_engine(true);
    let ids = engine
        .gmail_ids_by_filter(&cancel(), &MessageFilter::default())
        .unwrap();
    assert_eq!(ids, vec!["msg6", "msg5", "msg4", "msg3", "msg2", "msg1"]);

    let limited = engine
        .gmail_ids_by_filter(
            &cancel(),
            &MessageFilter {
                limit: 2,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(limited, vec!["msg6", "msg5"]);
}

#[test]
fn test_get_message_detail() {
    let engine = row_engine(true);
    let detail = engine
        .get_message_by_source_id(&cancel(), "msg2")
        .unwrap()
        .expect("msg2 detail");
    assert_eq!(detail.summary.subject.as_deref(), Some("Re: Hello"));
    assert_eq!(detail.summary.thread_id.as_deref(), Some("t1"));
    assert_eq!(detail.to.len(), 1);
    assert_eq!(detail.to[0].email.as_deref(), Some(BOB));
    assert_eq!(detail.to[0].name.as_deref(), Some("Bob Jones"));
    assert_eq!(detail.cc.len(), 1);
    assert_eq!(detail.cc[0].email.as_deref(), Some(DAN));
    assert_eq!(detail.attachments.len(), 2);
    assert!(detail.body_text.unwrap().contains("attached"));
    assert!(detail.summary.labels.contains(&"IMPORTANT".to_string()));

    assert!(engine.get_message(&cancel(), 999_999).unwrap().is_none());
}

#[test]
fn test_detail_falls_back_to_raw_mime_body() {
    let engine = row_engine(true);
    let detail = engine
        .get_message_by_source_id(&cancel(), "msg5")
        .unwrap()
        .expect("msg5 detail");
    assert_eq!(detail.body_text.as_deref().map(str::trim), Some("wrap it up this week"));
}

#[test]
fn test_get_attachment() {
    let engine = row_engine(true);
    // Attachment ids are assigned in insert order starting at 1
    let attachment = engine
        .get_attachment(&cancel(), 1)
        .unwrap()
        .expect("first attachment");
    assert_eq!(attachment.filename.as_deref(), Some("report.pdf"));
    assert_eq!(attachment.size, Some(5000));

    assert!(engine.get_attachment(&cancel(), 999).unwrap().is_none());
}

#[test]
fn test_time_aggregate_buckets() {
    let engine = row_engine(true);
    let opts = AggregateOptions {
        sort_by: SortField::Name,
        sort_dir: SortDirection::Asc,
        granularity: TimeGranularity::Month,
        ..Default::default()
    };
    let rows = engine.aggregate(&cancel(), ViewType::Time, &opts).unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
    assert_eq!(rows[0].count, 2);
}

#[test]
fn test_time_period_filter_drills_into_bucket() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        time_period: Some("2024-01".to_string()),
        ..Default::default()
    };
    let mut ids = gmail_ids(&engine.list_messages(&cancel(), &filter).unwrap());
    ids.sort();
    assert_eq!(ids, vec!["msg1", "msg2"]);

    let year = MessageFilter {
        time_period: Some("2024".to_string()),
        ..Default::default()
    };
    assert_eq!(engine.list_messages(&cancel(), &year).unwrap().len(), 6);
}

#[test]
fn test_aggregate_with_non_matching_search_is_empty() {
    let engine = row_engine(true);
    let opts = AggregateOptions {
        search_query: "zzz-nothing-matches".to_string(),
        ..Default::default()
    };
    let rows = engine.aggregate(&cancel(), ViewType::Senders, &opts).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_aggregate_attachment_rollup() {
    let engine = row_engine(true);
    let rows = engine
        .aggregate(&cancel(), ViewType::Senders, &AggregateOptions::default())
        .unwrap();
    let alice_row = rows.iter().find(|r| r.key == ALICE).unwrap();
    assert_eq!(alice_row.attachment_size, 7500);
    assert_eq!(alice_row.attachment_count, 2);
    assert_eq!(alice_row.total_size, 1200 + 8400 + 900);
    let bob_row = rows.iter().find(|r| r.key == BOB).unwrap();
    assert_eq!(bob_row.attachment_size, 700);
    assert_eq!(bob_row.attachment_count, 1);
}

#[test]
fn test_sender_names_and_domains_views() {
    let engine = row_engine(true);
    let names = engine
        .aggregate(&cancel(), ViewType::SenderNames, &AggregateOptions::default())
        .unwrap();
    assert_eq!(names[0].key, "Alice Smith");
    assert_eq!(names[0].count, 3);

    let domains = engine
        .aggregate(&cancel(), ViewType::Domains, &AggregateOptions::default())
        .unwrap();
    assert_eq!(domains[0].key, "example.com");
    assert_eq!(domains[0].count, 3);
    assert_eq!(domains[1].key, "company.org");
    assert_eq!(domains[1].count, 2);
}

#[test]
fn test_search_fast_merges_filter() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        sender: Some(ALICE.to_string()),
        with_attachments_only: true,
        ..Default::default()
    };
    let hits = engine
        .search_fast(&cancel(), &Query::default(), &filter, 100, 0)
        .unwrap();
    assert_eq!(gmail_ids(&hits), vec!["msg2"]);

    let count = engine
        .search_fast_count(&cancel(), &Query::default(), &filter)
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_search_fast_with_stats() {
    let engine = row_engine(true);
    let query = parse_query("from:alice@example.com");
    let results = engine
        .search_fast_with_stats(
            &cancel(),
            &query,
            "from:alice@example.com",
            &MessageFilter::default(),
            Some(ViewType::Recipients),
            2,
            0,
        )
        .unwrap();
    assert_eq!(results.messages.len(), 2);
    assert_eq!(results.total_count, 3);
    let stats = results.stats.expect("stats requested");
    assert_eq!(stats[0].key, BOB);
    assert_eq!(stats[0].count, 3);
}

#[test]
fn test_list_accounts() {
    let engine = row_engine(true);
    let accounts = engine.list_accounts(&cancel()).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].source_type, "gmail");
    assert_eq!(accounts[0].identifier, "me@example.com");
    assert_eq!(accounts[0].message_count, 6);
}

#[test]
fn test_total_stats() {
    let engine = row_engine(true);
    let totals = engine
        .total_stats(&cancel(), &StatsOptions::default())
        .unwrap();
    assert_eq!(totals.message_count, 6);
    assert_eq!(totals.attachment_count, 3);
    assert_eq!(totals.attachment_size, 8200);

    let with_attachments = engine
        .total_stats(
            &cancel(),
            &StatsOptions {
                with_attachments_only: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(with_attachments.message_count, 2);

    // Search restriction counts distinct messages and their attachments only
    let searched = engine
        .total_stats(
            &cancel(),
            &StatsOptions {
                search_query: "hello".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(searched.message_count, 2);
    assert_eq!(searched.attachment_count, 2);

    // Labels grouping retargets text terms at label names
    let labeled = engine
        .total_stats(
            &cancel(),
            &StatsOptions {
                search_query: "work".to_string(),
                group_by: Some(ViewType::Labels),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(labeled.message_count, 2);
}

#[test]
fn test_list_sorting_and_paging() {
    let engine = row_engine(true);
    let by_size = MessageFilter {
        sort_by: vault::MessageSortField::Size,
        sort_dir: SortDirection::Desc,
        limit: 3,
        ..Default::default()
    };
    let hits = engine.list_messages(&cancel(), &by_size).unwrap();
    assert_eq!(gmail_ids(&hits), vec!["msg2", "msg4", "msg1"]);

    let page2 = MessageFilter {
        sort_by: vault::MessageSortField::Size,
        sort_dir: SortDirection::Desc,
        limit: 3,
        offset: 3,
        ..Default::default()
    };
    let hits = engine.list_messages(&cancel(), &page2).unwrap();
    assert_eq!(gmail_ids(&hits), vec!["msg3", "msg5", "msg6"]);
}

#[test]
fn test_label_filter_case_insensitive() {
    let engine = row_engine(true);
    let filter = MessageFilter {
        label: Some("work".to_string()),
        ..Default::default()
    };
    let mut ids = gmail_ids(&engine.list_messages(&cancel(), &filter).unwrap());
    ids.sort();
    assert_eq!(ids, vec!["msg1", "msg4"]);
}
