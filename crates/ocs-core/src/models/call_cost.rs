//! Session descriptors and their priced result

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timespan::{RatingInfo, TimeSpans};
use super::traffic::TrafficType;
use crate::traits::RatingRequest;

/// Priced (and possibly debited) session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallCost {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub tor: TrafficType,
    /// Usage cost plus the connect fee when it was charged
    pub cost: Decimal,
    pub timespans: TimeSpans,
    /// Whether the connect fee of the first span is due
    pub deduct_connect_fee: bool,
}

impl CallCost {
    /// Connect fee of the first span's rate interval
    pub fn connect_fee(&self) -> Decimal {
        self.timespans
            .first()
            .and_then(|ts| ts.rate_interval.as_ref())
            .map(|ri| ri.connect_fee())
            .unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        self.timespans.total_duration()
    }

    /// Recompute span costs and the total, adding `connect_fee` when charged
    pub fn update_cost(&mut self, connect_fee: Decimal) {
        for ts in self.timespans.iter_mut() {
            ts.cost = ts.calculate_cost();
        }
        self.cost = self.timespans.total_cost() + connect_fee;
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.first().map(|ts| ts.time_start)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.last().map(|ts| ts.time_end)
    }
}

/// Request to price and debit one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub tenant: String,
    /// Tenant-qualified id of the charged account
    pub account: String,
    pub subject: String,
    #[serde(default)]
    pub category: String,
    pub destination: String,
    #[serde(default)]
    pub tor: TrafficType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Rating plan matches by activation time, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rating_infos: Vec<RatingInfo>,
    /// Priced spans attached by the rating resolver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_cost: Option<CallCost>,
}

impl CallDescriptor {
    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Empty call cost carrying this descriptor's identity
    pub fn create_call_cost(&self) -> CallCost {
        CallCost {
            category: self.category.clone(),
            tenant: self.tenant.clone(),
            subject: self.subject.clone(),
            account: self.account.clone(),
            destination: self.destination.clone(),
            tor: self.tor,
            ..CallCost::default()
        }
    }

    /// Rating lookup for `subject` over `[time_start, time_end)`
    pub fn rating_request(
        &self,
        subject: &str,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> RatingRequest {
        RatingRequest {
            tenant: self.tenant.clone(),
            subject: subject.to_string(),
            category: self.category.clone(),
            destination: self.destination.clone(),
            tor: self.tor,
            time_start,
            time_end,
        }
    }
}
