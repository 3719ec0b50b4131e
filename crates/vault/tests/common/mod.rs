//! Shared test corpus
//!
//! One source, four participants, five regular messages plus one message
//! with no sender and no labels for empty-bucket drill-down.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use vault::models::Address;
use vault::storage::{NewAttachment, NewConversation, NewMessage, RawBody, StoreWriter};
use vault::{CancelToken, SqliteEngine};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@company.org";
pub const CAROL: &str = "carol@example.com";
pub const DAN: &str = "dan@other.net";

pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn alice() -> Address {
    Address::with_name("Alice Smith", ALICE)
}

fn bob() -> Address {
    Address::with_name("Bob Jones", BOB)
}

fn carol() -> Address {
    Address::new(CAROL)
}

fn dan() -> Address {
    Address::new(DAN)
}

fn thread(id: &str, title: &str) -> Option<NewConversation> {
    Some(NewConversation {
        source_conversation_id: id.to_string(),
        title: Some(title.to_string()),
    })
}

/// Seed the standard corpus into a fresh in-memory store.
pub fn corpus_writer(with_fts: bool) -> StoreWriter {
    let mut writer = StoreWriter::open_in_memory().unwrap();
    if with_fts {
        writer.enable_search_index().unwrap();
    }
    let source = writer
        .add_source("gmail", "me@example.com", Some("Personal"))
        .unwrap();

    // msg1: Hello World, alice -> bob + carol, INBOX + Work
    let mut msg1 = NewMessage::new(source, "msg1", ts(2024, 1, 15, 10, 0));
    msg1.conversation = thread("t1", "Hello World");
    msg1.subject = Some("Hello World".to_string());
    msg1.snippet = Some("Hello world, kicking things off".to_string());
    msg1.body_text = Some("Hello world, kicking things off with a quick note.".to_string());
    msg1.size_estimate = 1200;
    msg1.from = Some(alice());
    msg1.to = vec![bob(), carol()];
    msg1.labels = vec!["INBOX".to_string(), "Work".to_string()];
    writer.add_message(&msg1).unwrap();

    // msg2: Re: Hello, alice -> bob cc dan, INBOX + IMPORTANT, 2 attachments
    let mut msg2 = NewMessage::new(source, "msg2", ts(2024, 1, 16, 11, 0));
    msg2.conversation = thread("t1", "Hello World");
    msg2.subject = Some("Re: Hello".to_string());
    msg2.snippet = Some("Hello again with the files attached".to_string());
    msg2.body_text = Some("Hello again, both files are attached.".to_string());
    msg2.size_estimate = 8400;
    msg2.from = Some(alice());
    msg2.to = vec![bob()];
    msg2.cc = vec![dan()];
    msg2.labels = vec!["INBOX".to_string(), "IMPORTANT".to_string()];
    msg2.attachments = vec![
        NewAttachment {
            filename: Some("report.pdf".to_string()),
            mime_type: Some("application/pdf".to_string()),
            size: Some(5000),
            content_hash: Some("c1".to_string()),
        },
        NewAttachment {
            filename: Some("chart.png".to_string()),
            mime_type: Some("image/png".to_string()),
            size: Some(2500),
            content_hash: Some("c2".to_string()),
        },
    ];
    writer.add_message(&msg2).unwrap();

    // msg3: Follow up, alice -> bob, INBOX
    let mut msg3 = NewMessage::new(source, "msg3", ts(2024, 2, 1, 9, 0));
    msg3.conversation = thread("t2", "Follow up");
    msg3.subject = Some("Follow up".to_string());
    msg3.snippet = Some("Checking in on the plan".to_string());
    msg3.body_text = Some("Just checking in on the plan.".to_string());
    msg3.size_estimate = 900;
    msg3.from = Some(alice());
    msg3.to = vec![bob()];
    msg3.labels = vec!["INBOX".to_string()];
    writer.add_message(&msg3).unwrap();

    // msg4: Question, bob -> alice, INBOX + Work, 1 attachment
    let mut msg4 = NewMessage::new(source, "msg4", ts(2024, 2, 15, 14, 30));
    msg4.conversation = thread("t3", "Question");
    msg4.subject = Some("Question".to_string());
    msg4.snippet = Some("Quick question about the notes".to_string());
    msg4.body_text = Some("Quick question about the notes, see attachment.".to_string());
    msg4.size_estimate = 2100;
    msg4.from = Some(bob());
    msg4.to = vec![alice()];
    msg4.labels = vec!["INBOX".to_string(), "Work".to_string()];
    msg4.attachments = vec![NewAttachment {
        filename: Some("notes.txt".to_string()),
        mime_type: Some("text/plain".to_string()),
        size: Some(700),
        content_hash: Some("c3".to_string()),
    }];
    writer.add_message(&msg4).unwrap();

    // msg5: Final, bob -> alice, INBOX; body only in the raw blob
    let mut msg5 = NewMessage::new(source, "msg5", ts(2024, 3, 1, 8, 15));
    msg5.conversation = thread("t4", "Final");
    msg5.subject = Some("Final".to_string());
    msg5.snippet = Some("Wrapping up".to_string());
    msg5.size_estimate = 600;
    msg5.from = Some(bob());
    msg5.to = vec![alice()];
    msg5.labels = vec!["INBOX".to_string()];
    msg5.raw = Some(RawBody {
        data: b"Subject: Final\r\n\r\nwrap it up this week".to_vec(),
        compress: true,
    });
    writer.add_message(&msg5).unwrap();

    // msg6: no sender, no labels; drill-down target for empty buckets
    let mut msg6 = NewMessage::new(source, "msg6", ts(2024, 4, 1, 12, 0));
    msg6.subject = Some("System notice".to_string());
    msg6.snippet = Some("Automated maintenance notice".to_string());
    msg6.size_estimate = 300;
    msg6.to = vec![bob()];
    writer.add_message(&msg6).unwrap();

    writer
}

pub fn row_engine(with_fts: bool) -> SqliteEngine {
    SqliteEngine::from_connection(corpus_writer(with_fts).into_connection())
}

pub fn cancel() -> CancelToken {
    CancelToken::new()
}

/// Gmail ids of a summary list, in result order.
pub fn gmail_ids(summaries: &[vault::MessageSummary]) -> Vec<String> {
    summaries.iter().map(|s| s.gmail_id.clone()).collect()
}
