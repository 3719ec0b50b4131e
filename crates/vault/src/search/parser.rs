//! Gmail-style query parser
//!
//! Parses search queries with operators like:
//! - `from:alice@example.com` - sender filter (`from:@example.com` matches the domain)
//! - `to:team@company.org`, `cc:`, `bcc:` - recipient filters
//! - `subject:meeting` - subject filter
//! - `label:work` / `in:work` - label filter
//! - `has:attachment` - attachment filter
//! - `before:2024/12/01`, `after:2024/01/01` - date filters
//! - `larger:5M`, `smaller:200K` - size filters
//! - `account:2` - account filter
//!
//! Everything else is treated as free-text search terms.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::query::Query;

/// Operator keys the parser recognises; anything else stays free text.
const OPERATORS: [&str; 13] = [
    "from", "to", "cc", "bcc", "subject", "label", "in", "has", "before", "after", "larger",
    "smaller", "account",
];

/// One lexed unit of the query string.
enum Token {
    /// `key:value` with a recognised key and non-empty value
    Operator(String, String),
    /// A bare word or quoted phrase
    Word(String),
}

/// Parse a search query string into structured components.
pub fn parse_query(input: &str) -> Query {
    let mut query = Query::default();

    let mut rest = input;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let (token, remainder) = next_token(rest);
        rest = remainder;

        match token {
            Token::Operator(key, value) => apply_operator(&mut query, &key, value),
            Token::Word(word) => {
                if !word.is_empty() {
                    query.text_terms.push(word);
                }
            }
        }
    }

    query
}

fn apply_operator(query: &mut Query, key: &str, value: String) {
    match key {
        "from" => query.from_addrs.push(value),
        "to" => query.to_addrs.push(value),
        "cc" => query.cc_addrs.push(value),
        "bcc" => query.bcc_addrs.push(value),
        "subject" => query.subject_terms.push(value),
        "label" | "in" => query.labels.push(value),
        "has" => {
            if value.eq_ignore_ascii_case("attachment") {
                query.has_attachment = Some(true);
            }
        }
        "before" => {
            if let Some(date) = parse_date(&value) {
                query.before_date = Some(date);
            }
        }
        "after" => {
            if let Some(date) = parse_date(&value) {
                query.after_date = Some(date);
            }
        }
        "larger" => query.larger_than = parse_size(&value),
        "smaller" => query.smaller_than = parse_size(&value),
        "account" => query.account_id = value.parse().ok(),
        _ => {}
    }
}

/// Lex the next token off the front of the input.
///
/// The input must start with a non-whitespace character. An operator is a
/// recognised key immediately followed by `:` and a non-empty value;
/// anything else (unknown key, empty value, quoted start) lexes as a word.
fn next_token(input: &str) -> (Token, &str) {
    if let Some((key, after_colon)) = split_operator(input) {
        let (value, rest) = take_value(after_colon);
        if !value.is_empty() {
            return (Token::Operator(key, value), rest);
        }
    }

    let (word, rest) = take_value(input);
    (Token::Word(word), rest)
}

/// Split `key:` off the front when the key is a recognised operator.
fn split_operator(input: &str) -> Option<(String, &str)> {
    let colon = input.find(':')?;
    let key = &input[..colon];
    if key.contains(char::is_whitespace) {
        return None;
    }

    let key = key.to_ascii_lowercase();
    if !OPERATORS.contains(&key.as_str()) {
        return None;
    }
    Some((key, &input[colon + 1..]))
}

/// Take one value off the front: everything up to the closing quote when
/// the input opens with `"` (an unterminated quote runs to the end),
/// otherwise everything up to the next whitespace.
fn take_value(input: &str) -> (String, &str) {
    if let Some(quoted) = input.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => (quoted[..end].to_string(), &quoted[end + 1..]),
            None => (quoted.to_string(), ""),
        };
    }

    let end = input
        .find(char::is_whitespace)
        .unwrap_or(input.len());
    (input[..end].to_string(), &input[end..])
}

/// Parse a date value into a UTC midnight timestamp. Both `YYYY-MM-DD` and
/// `YYYY/MM/DD` are accepted; slashes normalize to dashes before the parse.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.replace('/', "-");
    let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parse a size with an optional K/M/G suffix ("500", "200K", "5M")
fn parse_size(input: &str) -> Option<i64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (number, multiplier) = match input.chars().last() {
        Some('k') | Some('K') => (&input[..input.len() - 1], 1024),
        Some('m') | Some('M') => (&input[..input.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&input[..input.len() - 1], 1024 * 1024 * 1024),
        _ => (input, 1),
    };

    number.parse::<i64>().ok().map(|n| n * multiplier)
}
