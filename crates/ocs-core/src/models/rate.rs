//! Pricing rules attached to time spans by the rating resolver

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::utils::{self, duration_nanos};

/// Rounding applied to computed costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoundingMethod {
    #[serde(rename = "*up")]
    Up,
    #[default]
    #[serde(rename = "*middle")]
    Middle,
    #[serde(rename = "*down")]
    Down,
}

impl RoundingMethod {
    pub fn round(&self, value: Decimal, decimals: u32) -> Decimal {
        let strategy = match self {
            RoundingMethod::Up => RoundingStrategy::AwayFromZero,
            RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
            RoundingMethod::Down => RoundingStrategy::ToZero,
        };
        value.round_dp_with_strategy(decimals, strategy)
    }
}

/// One price tier, applying from `group_interval_start` into the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Session offset from which this tier applies
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub group_interval_start: Duration,
    /// Price of one `rate_unit`
    pub value: Decimal,
    /// Billing step; usage is rounded up to a multiple of it
    #[serde(with = "duration_nanos")]
    pub rate_increment: Duration,
    /// Duration the `value` is quoted for
    #[serde(with = "duration_nanos")]
    pub rate_unit: Duration,
}

/// Price tiers plus connect fee and rounding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RIRate {
    #[serde(default)]
    pub connect_fee: Decimal,
    #[serde(default)]
    pub rounding_method: RoundingMethod,
    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,
    /// Tiers ordered by `group_interval_start`
    pub rates: Vec<Rate>,
}

fn default_rounding_decimals() -> u32 {
    4
}

impl Default for RIRate {
    fn default() -> Self {
        Self {
            connect_fee: Decimal::ZERO,
            rounding_method: RoundingMethod::default(),
            rounding_decimals: default_rounding_decimals(),
            rates: Vec::new(),
        }
    }
}

impl RIRate {
    /// Tier in force at session offset `start`
    pub fn rate_for(&self, start: Duration) -> Option<&Rate> {
        self.rates
            .iter()
            .filter(|rate| rate.group_interval_start <= start)
            .max_by_key(|rate| rate.group_interval_start)
    }

    pub fn round(&self, value: Decimal) -> Decimal {
        self.rounding_method.round(value, self.rounding_decimals)
    }
}

/// Daily window during which a rate interval applies
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RITiming {
    /// Days the window applies on; empty means every day
    #[serde(default)]
    pub week_days: Vec<Weekday>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
}

impl RITiming {
    /// Whether `t` falls inside the window; `end_inclusive` also accepts
    /// the window's closing instant.
    pub fn contains(&self, t: DateTime<Utc>, end_inclusive: bool) -> bool {
        // midnight closes the previous day's window
        let closes_day = end_inclusive && t.time() == NaiveTime::MIN;
        let weekday = if closes_day {
            (t - Duration::nanoseconds(1)).weekday()
        } else {
            t.weekday()
        };
        if !self.week_days.is_empty() && !self.week_days.contains(&weekday) {
            return false;
        }
        if closes_day {
            return self.end_time.is_none();
        }
        let start = self.start_time.unwrap_or(NaiveTime::MIN);
        let tod = t.time();
        match self.end_time {
            Some(end) => tod >= start && (tod < end || (end_inclusive && tod == end)),
            None => tod >= start,
        }
    }

    /// Closing instant of the window on `t`'s day
    pub fn right_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let day = t.date_naive();
        match self.end_time {
            Some(end) if t.time() < end => day.and_time(end).and_utc(),
            _ => day.and_time(NaiveTime::MIN).and_utc() + Duration::days(1),
        }
    }

    /// Opening instant of the window on `t`'s day
    pub fn left_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        t.date_naive()
            .and_time(self.start_time.unwrap_or(NaiveTime::MIN))
            .and_utc()
    }
}

/// Pricing rule of one time span
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateInterval {
    #[serde(default)]
    pub timing: Option<RITiming>,
    pub rating: RIRate,
    #[serde(default)]
    pub weight: Decimal,
}

impl RateInterval {
    pub fn contains(&self, t: DateTime<Utc>, end_inclusive: bool) -> bool {
        self.timing
            .as_ref()
            .map_or(true, |timing| timing.contains(t, end_inclusive))
    }

    pub fn connect_fee(&self) -> Decimal {
        self.rating.connect_fee
    }

    /// Price of `duration` starting at session offset `group_start`
    pub fn get_cost(&self, duration: Duration, group_start: Duration) -> Decimal {
        let Some(rate) = self.rating.rate_for(group_start) else {
            return Decimal::ZERO;
        };
        if rate.rate_unit <= Duration::zero() {
            return Decimal::ZERO;
        }
        let billed = utils::round_up(duration, rate.rate_increment);
        let cost = rate.value * utils::seconds(billed) / utils::seconds(rate.rate_unit);
        self.rating.round(cost)
    }

    /// `(value, rate_increment, rate_unit)` of the tier at `group_start`
    pub fn rate_parameters(&self, group_start: Duration) -> Option<(Decimal, Duration, Duration)> {
        self.rating
            .rate_for(group_start)
            .map(|rate| (rate.value, rate.rate_increment, rate.rate_unit))
    }
}
