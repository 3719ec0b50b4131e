//! View and sort enums shared by aggregates and list queries

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Dimension a message aggregate is grouped by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Senders,
    SenderNames,
    Recipients,
    RecipientNames,
    Domains,
    Labels,
    Time,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Senders => "senders",
            ViewType::SenderNames => "sender-names",
            ViewType::Recipients => "recipients",
            ViewType::RecipientNames => "recipient-names",
            ViewType::Domains => "domains",
            ViewType::Labels => "labels",
            ViewType::Time => "time",
        }
    }
}

impl FromStr for ViewType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "senders" => Ok(ViewType::Senders),
            "sender-names" => Ok(ViewType::SenderNames),
            "recipients" => Ok(ViewType::Recipients),
            "recipient-names" => Ok(ViewType::RecipientNames),
            "domains" => Ok(ViewType::Domains),
            "labels" => Ok(ViewType::Labels),
            "time" => Ok(ViewType::Time),
            other => Err(Error::validation(format!("unknown view type: {other}"))),
        }
    }
}

/// Bucket width for the time dimension.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Year,
    #[default]
    Month,
    Day,
}

impl TimeGranularity {
    /// strftime format for the bucket key.
    pub fn format(&self) -> &'static str {
        match self {
            TimeGranularity::Year => "%Y",
            TimeGranularity::Month => "%Y-%m",
            TimeGranularity::Day => "%Y-%m-%d",
        }
    }

    /// Infer granularity from a period key such as "2024", "2024-01", or
    /// "2024-01-15". The key's length wins over any configured granularity.
    pub fn from_period(period: &str) -> Option<Self> {
        match period.len() {
            4 => Some(TimeGranularity::Year),
            7 => Some(TimeGranularity::Month),
            10 => Some(TimeGranularity::Day),
            _ => None,
        }
    }
}

impl FromStr for TimeGranularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(TimeGranularity::Year),
            "month" => Ok(TimeGranularity::Month),
            "day" => Ok(TimeGranularity::Day),
            other => Err(Error::validation(format!("unknown time granularity: {other}"))),
        }
    }
}

/// Sort key for aggregate rows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Count,
    Size,
    AttachmentSize,
    Name,
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(SortField::Count),
            "size" => Ok(SortField::Size),
            "attachment-size" => Ok(SortField::AttachmentSize),
            "name" => Ok(SortField::Name),
            other => Err(Error::validation(format!("unknown sort field: {other}"))),
        }
    }
}

/// Sort direction for aggregates and lists.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Desc => "DESC",
            SortDirection::Asc => "ASC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desc" => Ok(SortDirection::Desc),
            "asc" => Ok(SortDirection::Asc),
            other => Err(Error::validation(format!("unknown sort direction: {other}"))),
        }
    }
}

/// Sort key for message lists.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageSortField {
    #[default]
    Date,
    Size,
    Subject,
}

impl FromStr for MessageSortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(MessageSortField::Date),
            "size" => Ok(MessageSortField::Size),
            "subject" => Ok(MessageSortField::Subject),
            other => Err(Error::validation(format!("unknown message sort field: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_type_round_trip() {
        for view in [
            ViewType::Senders,
            ViewType::SenderNames,
            ViewType::Recipients,
            ViewType::RecipientNames,
            ViewType::Domains,
            ViewType::Labels,
            ViewType::Time,
        ] {
            assert_eq!(view.as_str().parse::<ViewType>().unwrap(), view);
        }
    }

    #[test]
    fn test_unknown_names_are_validation_errors() {
        assert!("bogus".parse::<ViewType>().is_err());
        assert!("bogus".parse::<SortField>().is_err());
        assert!("bogus".parse::<MessageSortField>().is_err());
        assert!("bogus".parse::<TimeGranularity>().is_err());
    }

    #[test]
    fn test_granularity_from_period_length() {
        assert_eq!(TimeGranularity::from_period("2024"), Some(TimeGranularity::Year));
        assert_eq!(TimeGranularity::from_period("2024-01"), Some(TimeGranularity::Month));
        assert_eq!(TimeGranularity::from_period("2024-01-15"), Some(TimeGranularity::Day));
        assert_eq!(TimeGranularity::from_period("24"), None);
    }
}
