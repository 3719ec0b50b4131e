//! Structured search query and filter merging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageFilter;

/// Structured search query produced by [`parse_query`](super::parse_query).
///
/// Vec-valued fields combine with AND across fields and (for address lists)
/// OR within a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Free-text terms
    pub text_terms: Vec<String>,
    /// from: addresses; values starting with `@` match the address domain
    pub from_addrs: Vec<String>,
    /// to: addresses
    pub to_addrs: Vec<String>,
    /// cc: addresses
    pub cc_addrs: Vec<String>,
    /// bcc: addresses
    pub bcc_addrs: Vec<String>,
    /// subject: terms
    pub subject_terms: Vec<String>,
    /// label: terms
    pub labels: Vec<String>,
    /// has:attachment
    pub has_attachment: Option<bool>,
    /// after: date filter (inclusive)
    pub after_date: Option<DateTime<Utc>>,
    /// before: date filter (exclusive)
    pub before_date: Option<DateTime<Utc>>,
    /// larger: size filter in bytes
    pub larger_than: Option<i64>,
    /// smaller: size filter in bytes
    pub smaller_than: Option<i64>,
    /// account: filter
    pub account_id: Option<i64>,
    /// Exclude messages deleted from their source
    pub hide_deleted: bool,
}

impl Query {
    /// Check if the query has no terms or filters.
    pub fn is_empty(&self) -> bool {
        self.text_terms.is_empty()
            && self.from_addrs.is_empty()
            && self.to_addrs.is_empty()
            && self.cc_addrs.is_empty()
            && self.bcc_addrs.is_empty()
            && self.subject_terms.is_empty()
            && self.labels.is_empty()
            && self.has_attachment.is_none()
            && self.after_date.is_none()
            && self.before_date.is_none()
            && self.larger_than.is_none()
            && self.smaller_than.is_none()
            && self.account_id.is_none()
            && !self.hide_deleted
    }
}

/// Merge a drill-down filter into a parsed query, returning a new query.
///
/// The input query is never mutated; vec-valued fields are copied into
/// fresh backing storage before appending. Merges are additive except for
/// the account id, which is overwritten.
pub fn merge_filter_into_query(query: &Query, filter: &MessageFilter) -> Query {
    let mut merged = query.clone();

    if let Some(source_id) = filter.source_id {
        merged.account_id = Some(source_id);
    }
    if let Some(sender) = &filter.sender {
        merged.from_addrs.push(sender.clone());
    }
    if let Some(domain) = &filter.domain {
        merged.from_addrs.push(format!("@{domain}"));
    }
    if let Some(recipient) = &filter.recipient {
        merged.to_addrs.push(recipient.clone());
    }
    if let Some(label) = &filter.label {
        merged.labels.push(label.clone());
    }
    if filter.with_attachments_only {
        merged.has_attachment = Some(true);
    }
    if filter.hide_deleted_from_source {
        merged.hide_deleted = true;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_maps_filter_fields() {
        let query = Query {
            from_addrs: vec!["alice@example.com".to_string()],
            ..Default::default()
        };
        let filter = MessageFilter {
            source_id: Some(7),
            sender: Some("bob@company.org".to_string()),
            domain: Some("example.com".to_string()),
            recipient: Some("carol@example.com".to_string()),
            label: Some("Work".to_string()),
            with_attachments_only: true,
            hide_deleted_from_source: true,
            ..Default::default()
        };

        let merged = merge_filter_into_query(&query, &filter);
        assert_eq!(merged.account_id, Some(7));
        assert_eq!(
            merged.from_addrs,
            vec!["alice@example.com", "bob@company.org", "@example.com"]
        );
        assert_eq!(merged.to_addrs, vec!["carol@example.com"]);
        assert_eq!(merged.labels, vec!["Work"]);
        assert_eq!(merged.has_attachment, Some(true));
        assert!(merged.hide_deleted);
    }

    #[test]
    fn test_merge_does_not_mutate_input() {
        let query = Query {
            from_addrs: vec!["alice@example.com".to_string()],
            labels: vec!["INBOX".to_string()],
            ..Default::default()
        };
        let snapshot = query.clone();

        let filter = MessageFilter {
            sender: Some("bob@company.org".to_string()),
            label: Some("Work".to_string()),
            ..Default::default()
        };
        let _ = merge_filter_into_query(&query, &filter);

        assert_eq!(query, snapshot);
    }

    #[test]
    fn test_merge_overwrites_account_id() {
        let query = Query {
            account_id: Some(1),
            ..Default::default()
        };
        let filter = MessageFilter {
            source_id: Some(2),
            ..Default::default()
        };
        assert_eq!(merge_filter_into_query(&query, &filter).account_id, Some(2));
    }

    #[test]
    fn test_empty_filter_merge_is_identity() {
        let query = Query {
            text_terms: vec!["hello".to_string()],
            ..Default::default()
        };
        assert_eq!(merge_filter_into_query(&query, &MessageFilter::default()), query);
    }
}
