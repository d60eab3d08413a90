//! Traffic types and rating subject overrides

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::consts::{ZERO_RATING_PER_MINUTE, ZERO_RATING_PER_SECOND};
use crate::utils;

/// Category of consumption a balance collection is keyed by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum TrafficType {
    #[serde(rename = "*voice")]
    Voice,
    #[serde(rename = "*data")]
    Data,
    #[serde(rename = "*sms")]
    Sms,
    #[serde(rename = "*generic")]
    Generic,
    #[default]
    #[serde(rename = "*monetary")]
    Monetary,
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TrafficType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::Voice => "*voice",
            TrafficType::Data => "*data",
            TrafficType::Sms => "*sms",
            TrafficType::Generic => "*generic",
            TrafficType::Monetary => "*monetary",
        }
    }

    /// Parse from the `*`-prefixed tag
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "*voice" => Some(TrafficType::Voice),
            "*data" => Some(TrafficType::Data),
            "*sms" => Some(TrafficType::Sms),
            "*generic" => Some(TrafficType::Generic),
            "*monetary" => Some(TrafficType::Monetary),
            _ => None,
        }
    }

    /// Unit traffic may also be paid from `*generic` balances
    pub fn falls_back_to_generic(&self) -> bool {
        !matches!(self, TrafficType::Monetary | TrafficType::Generic)
    }

    /// Balance units consumed by `usage` of this traffic type.
    ///
    /// Voice is accounted in seconds; every other unit type carries its
    /// quantity as the nanosecond count of the usage.
    pub fn usage_units(&self, usage: Duration) -> Decimal {
        match self {
            TrafficType::Voice => utils::seconds(usage),
            _ => Decimal::from(utils::nanos(usage)),
        }
    }
}

/// Rating override carried by a balance, resolved once per debit pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RatingSubject {
    /// Priced by the call's own rating
    #[default]
    Default,
    /// Free; consumes one second of value per elapsed second
    FlatPerSecond,
    /// Free; consumes one minute of value per started minute
    FlatPerMinute,
    /// Re-rated with another subject's rating plan
    Custom(String),
}

impl RatingSubject {
    pub fn parse(subject: &str) -> Self {
        match subject {
            "" => RatingSubject::Default,
            ZERO_RATING_PER_SECOND => RatingSubject::FlatPerSecond,
            ZERO_RATING_PER_MINUTE => RatingSubject::FlatPerMinute,
            other => RatingSubject::Custom(other.to_string()),
        }
    }

    /// Consumption granularity of the flat subjects
    pub fn chunk(&self) -> Option<Duration> {
        match self {
            RatingSubject::FlatPerSecond => Some(Duration::seconds(1)),
            RatingSubject::FlatPerMinute => Some(Duration::minutes(1)),
            _ => None,
        }
    }
}
