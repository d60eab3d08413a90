//! Time spans: rate-consistent sub-intervals of a priced session

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use tracing::warn;

use super::increment::{Increment, Increments};
use super::rate::RateInterval;
use crate::utils::{self, duration_nanos};

/// Rating plan match applied from `activation_time` on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingInfo {
    #[serde(default)]
    pub matched_subject: String,
    #[serde(default)]
    pub matched_prefix: String,
    #[serde(default)]
    pub matched_dest_id: String,
    #[serde(default)]
    pub rating_plan_id: String,
    pub activation_time: DateTime<Utc>,
}

fn one() -> u32 {
    1
}

/// Contiguous sub-interval of a session priced by a single rate interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Cost of one copy of this span
    #[serde(default)]
    pub cost: Decimal,
    #[serde(default)]
    pub rate_interval: Option<RateInterval>,
    /// Cumulative session duration at this span's end
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub duration_index: Duration,
    #[serde(default)]
    pub increments: Increments,
    #[serde(default)]
    pub matched_subject: String,
    #[serde(default)]
    pub matched_prefix: String,
    #[serde(default)]
    pub matched_dest_id: String,
    #[serde(default)]
    pub rating_plan_id: String,
    #[serde(default = "one")]
    pub compress_factor: u32,
}

impl TimeSpan {
    pub fn new(time_start: DateTime<Utc>, time_end: DateTime<Utc>) -> Self {
        Self {
            time_start,
            time_end,
            cost: Decimal::ZERO,
            rate_interval: None,
            duration_index: time_end - time_start,
            increments: Increments::default(),
            matched_subject: String::new(),
            matched_prefix: String::new(),
            matched_dest_id: String::new(),
            rating_plan_id: String::new(),
            compress_factor: 1,
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Session offset at which this span starts
    pub fn group_start(&self) -> Duration {
        self.duration_index - self.duration()
    }

    /// Session offset at which this span ends
    pub fn group_end(&self) -> Duration {
        self.duration_index
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t > self.time_start && t < self.time_end
    }

    /// Attach `ri` unless a heavier interval is already set
    pub fn set_rate_interval(&mut self, ri: &RateInterval) {
        match &self.rate_interval {
            Some(current) if current.weight >= ri.weight => {}
            _ => self.rate_interval = Some(ri.clone()),
        }
    }

    pub fn set_rating_info(&mut self, info: &RatingInfo) {
        self.matched_subject = info.matched_subject.clone();
        self.matched_prefix = info.matched_prefix.clone();
        self.matched_dest_id = info.matched_dest_id.clone();
        self.rating_plan_id = info.rating_plan_id.clone();
    }

    fn copy_rating_info(&mut self, from: &TimeSpan) {
        self.matched_subject = from.matched_subject.clone();
        self.matched_prefix = from.matched_prefix.clone();
        self.matched_dest_id = from.matched_dest_id.clone();
        self.rating_plan_id = from.rating_plan_id.clone();
    }

    /// Cost from the increments, or from the rate interval before any exist
    pub fn calculate_cost(&self) -> Decimal {
        if !self.increments.is_empty() {
            return self.increments.total_cost();
        }
        self.rate_interval
            .as_ref()
            .map(|ri| ri.get_cost(self.duration(), self.group_start()))
            .unwrap_or(self.cost)
    }

    /// Generate one increment per rate increment unless increments exist.
    ///
    /// More than `ceiling` increments leaves the set empty and returns false.
    pub fn create_increments(&mut self, ceiling: usize) -> bool {
        if !self.increments.is_empty() {
            return true;
        }
        let duration = self.duration();
        let (step, cost) = match &self.rate_interval {
            Some(ri) => {
                let step = ri
                    .rate_parameters(self.group_start())
                    .map(|(_, increment, _)| increment)
                    .filter(|increment| *increment > Duration::zero())
                    .unwrap_or(duration);
                (step, ri.get_cost(step, self.group_start()))
            }
            None => (duration, self.cost),
        };
        let count = utils::ceil_div(duration, step);
        if count <= 0 {
            return true;
        }
        if count as u64 > ceiling as u64 {
            warn!(
                "Time span {} - {} needs {} increments, above the ceiling of {}",
                self.time_start, self.time_end, count, ceiling
            );
            return false;
        }
        let mut increments = Vec::with_capacity(count as usize);
        let mut left = duration;
        for _ in 0..count {
            let slice = if left < step { left } else { step };
            increments.push(Increment::new(slice, cost));
            left = left - slice;
        }
        self.increments = Increments(increments);
        self.cost = self.increments.total_cost();
        true
    }

    /// Whether every increment is attributed or free, and the first that is not
    pub fn is_paid(&self) -> (bool, usize) {
        match self
            .increments
            .iter()
            .position(|inc| inc.debit_info.is_empty() && inc.cost > Decimal::ZERO)
        {
            Some(index) => (false, index),
            None => (true, self.increments.len()),
        }
    }

    pub fn time_start_for_increment(&self, index: usize) -> DateTime<Utc> {
        self.time_start
            + self
                .increments
                .iter()
                .take(index)
                .fold(Duration::zero(), |acc, inc| acc + inc.total_duration())
    }

    /// Move the head's duration index back by the tail's duration
    pub fn set_new_duration_index(&mut self, tail: &TimeSpan) {
        let index = self.duration_index - tail.duration();
        self.duration_index = index.max(Duration::zero());
    }

    /// Extend the span so its duration is a multiple of `step`
    pub fn round_to_duration(&mut self, step: Duration) {
        let duration = self.duration();
        let rounded = utils::round_up(duration, step);
        if rounded > duration {
            self.time_end = self.time_start + rounded;
            self.duration_index = self.duration_index + (rounded - duration);
        }
    }

    /// Empty tail starting at `split_time`, with the rating copied over
    fn tail_at(&self, split_time: DateTime<Utc>) -> TimeSpan {
        let mut tail = TimeSpan::new(split_time, self.time_end);
        tail.rate_interval = self.rate_interval.clone();
        tail.duration_index = self.duration_index;
        tail.copy_rating_info(self);
        tail
    }

    fn finish_split(&mut self, tail: &mut TimeSpan) {
        self.time_end = tail.time_start;
        self.set_new_duration_index(tail);
        self.cost = self.calculate_cost();
        tail.cost = tail.calculate_cost();
    }

    /// Split off the increments from `index` on into a new tail span
    pub fn split_by_increment(&mut self, index: usize) -> Option<TimeSpan> {
        if index == 0 || index >= self.increments.len() {
            return None;
        }
        let mut tail = self.tail_at(self.time_start_for_increment(index));
        tail.increments = Increments(self.increments.split_off(index));
        self.finish_split(&mut tail);
        Some(tail)
    }

    /// Split `at` into the span, cutting the straddling increment in two.
    ///
    /// Both halves of a cut increment keep its attribution; its cost is
    /// shared in proportion to duration.
    pub fn split_by_duration(&mut self, at: Duration) -> Option<TimeSpan> {
        if at <= Duration::zero() || at >= self.duration() {
            return None;
        }
        let mut tail = self.tail_at(self.time_start + at);
        if !self.increments.is_empty() {
            self.increments.decompress();
            let mut elapsed = Duration::zero();
            let mut index = 0;
            while index < self.increments.len()
                && elapsed + self.increments[index].duration <= at
            {
                elapsed = elapsed + self.increments[index].duration;
                index += 1;
            }
            let mut rest = self.increments.split_off(index);
            if elapsed < at {
                if let Some(straddling) = rest.first_mut() {
                    let head_part = at - elapsed;
                    let head_cost = straddling.cost * utils::seconds(head_part)
                        / utils::seconds(straddling.duration);
                    let mut head = straddling.clone();
                    head.duration = head_part;
                    head.cost = head_cost;
                    straddling.duration = straddling.duration - head_part;
                    straddling.cost -= head_cost;
                    self.increments.push(head);
                }
            }
            tail.increments = Increments(rest);
        }
        self.finish_split(&mut tail);
        Some(tail)
    }

    /// Split where `ri` starts or stops applying, attaching `ri` to the part
    /// it covers. `data` sessions only take the interval, never split by
    /// timing.
    pub fn split_by_rate_interval(&mut self, ri: &RateInterval, data: bool) -> Option<TimeSpan> {
        if !(ri.contains(self.time_start, false) || ri.contains(self.time_end, true)) {
            return None;
        }
        let (group_start, group_end) = (self.group_start(), self.group_end());
        let tier_boundary = ri
            .rating
            .rates
            .iter()
            .map(|rate| rate.group_interval_start)
            .filter(|start| group_start < *start && group_end > *start)
            .min();
        if let Some(boundary) = tier_boundary {
            self.set_rate_interval(ri);
            let mut tail = self.split_by_duration(boundary - group_start)?;
            tail.set_rate_interval(ri);
            return Some(tail);
        }
        if data {
            if ri.contains(self.time_start, false) {
                self.set_rate_interval(ri);
            }
            return None;
        }
        let starts_inside = ri.contains(self.time_start, false);
        if starts_inside && ri.contains(self.time_end, true) {
            self.set_rate_interval(ri);
            return None;
        }
        let timing = ri.timing.as_ref()?;
        if starts_inside {
            let split_time = timing.right_margin(self.time_start);
            let tail = if split_time > self.time_start && split_time < self.time_end {
                self.split_by_duration(split_time - self.time_start)
            } else {
                None
            };
            self.set_rate_interval(ri);
            return tail;
        }
        let split_time = timing.left_margin(self.time_end);
        if split_time <= self.time_start || split_time >= self.time_end {
            return None;
        }
        let mut tail = self.split_by_duration(split_time - self.time_start)?;
        tail.set_rate_interval(ri);
        Some(tail)
    }

    /// Split at the activation time of a newer rating plan
    pub fn split_by_rating_plan(&mut self, info: &RatingInfo) -> Option<TimeSpan> {
        if info.activation_time <= self.time_start || info.activation_time >= self.time_end {
            return None;
        }
        let mut tail = self.split_by_duration(info.activation_time - self.time_start)?;
        tail.set_rating_info(info);
        Some(tail)
    }

    /// Split at the first midnight inside the span
    pub fn split_by_day(&mut self) -> Option<TimeSpan> {
        let midnight =
            self.time_start.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
        if midnight >= self.time_end {
            return None;
        }
        self.split_by_duration(midnight - self.time_start)
    }

    /// Same pricing rule, rating match and increment signature
    pub fn same_rating(&self, other: &TimeSpan) -> bool {
        self.rate_interval == other.rate_interval
            && self.matched_subject == other.matched_subject
            && self.matched_prefix == other.matched_prefix
            && self.matched_dest_id == other.matched_dest_id
            && self.rating_plan_id == other.rating_plan_id
            && self.increments.same_signature(&other.increments)
    }

    /// Absorb the adjacent `other`, handing it back when the two differ
    pub fn merge(&mut self, other: TimeSpan) -> Result<(), TimeSpan> {
        if self.time_end != other.time_start
            || self.compress_factor != 1
            || other.compress_factor != 1
            || !self.same_rating(&other)
        {
            return Err(other);
        }
        self.time_end = other.time_end;
        self.duration_index = other.duration_index;
        self.cost += other.cost;
        self.increments.extend(other.increments.0);
        Ok(())
    }
}

/// Ordered time spans of a session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpans(pub Vec<TimeSpan>);

impl Deref for TimeSpans {
    type Target = Vec<TimeSpan>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TimeSpans {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<TimeSpan>> for TimeSpans {
    fn from(spans: Vec<TimeSpan>) -> Self {
        Self(spans)
    }
}

fn merge_halves(mut spans: Vec<TimeSpan>) -> Vec<TimeSpan> {
    if spans.len() < 2 {
        return spans;
    }
    let right = spans.split_off(spans.len() / 2);
    let mut merged = merge_halves(spans);
    let mut right = merge_halves(right).into_iter();
    if let Some(first) = right.next() {
        match merged.last_mut() {
            Some(seam) => {
                if let Err(first) = seam.merge(first) {
                    merged.push(first);
                }
            }
            None => merged.push(first),
        }
    }
    merged.extend(right);
    merged
}

impl TimeSpans {
    pub fn total_cost(&self) -> Decimal {
        self.0
            .iter()
            .map(|ts| ts.cost * Decimal::from(ts.compress_factor.max(1)))
            .sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.0.iter().fold(Duration::zero(), |acc, ts| {
            acc + utils::times(ts.duration(), i64::from(ts.compress_factor.max(1)))
        })
    }

    /// Join every adjacent pair with the same rating, halving recursively
    pub fn merge(&mut self) {
        self.0 = merge_halves(std::mem::take(&mut self.0));
    }

    /// Drop spans covered by the span at `index` and trim the one it overlaps
    pub fn remove_overlapped_from_index(&mut self, index: usize) {
        let Some(end) = self.0.get(index).map(|ts| ts.time_end) else {
            return;
        };
        let next = index + 1;
        while next < self.0.len() && self.0[next].time_end <= end {
            self.0.remove(next);
        }
        if let Some(partial) = self.0.get_mut(next) {
            if partial.time_start < end {
                if let Some(tail) = partial.split_by_duration(end - partial.time_start) {
                    *partial = tail;
                }
            }
        }
    }

    /// Collapse runs of identical, contiguous spans into one with a repeat count
    pub fn compress(&mut self) {
        let mut compressed: Vec<TimeSpan> = Vec::with_capacity(self.0.len());
        for ts in self.0.drain(..) {
            match compressed.last_mut() {
                Some(last)
                    if last.duration() == ts.duration()
                        && last.cost == ts.cost
                        && ts.compress_factor == 1
                        && last.time_start
                            + utils::times(last.duration(), i64::from(last.compress_factor))
                            == ts.time_start
                        && last.same_rating(&ts) =>
                {
                    last.compress_factor += 1;
                    last.duration_index = ts.duration_index;
                }
                _ => compressed.push(ts),
            }
        }
        self.0 = compressed;
    }

    /// Expand repeat counts back into consecutive spans
    pub fn decompress(&mut self) {
        let mut expanded = Vec::with_capacity(self.0.len());
        for ts in self.0.drain(..) {
            let factor = i64::from(ts.compress_factor.max(1));
            let duration = ts.duration();
            for k in 0..factor {
                let mut copy = ts.clone();
                copy.compress_factor = 1;
                copy.time_start = ts.time_start + utils::times(duration, k);
                copy.time_end = copy.time_start + duration;
                copy.duration_index = ts.duration_index - utils::times(duration, factor - 1 - k);
                expanded.push(copy);
            }
        }
        self.0 = expanded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::increment::{DebitInfo, MonetaryInfo};
    use crate::models::rate::{RIRate, RITiming, Rate};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 9, 24, 10, 48, 0).unwrap() + Duration::seconds(secs)
    }

    fn rate(value: Decimal, increment: i64, unit: i64) -> RateInterval {
        RateInterval {
            rating: RIRate {
                rates: vec![Rate {
                    group_interval_start: Duration::zero(),
                    value,
                    rate_increment: Duration::seconds(increment),
                    rate_unit: Duration::seconds(unit),
                }],
                ..RIRate::default()
            },
            ..RateInterval::default()
        }
    }

    fn priced(from: i64, to: i64, ri: &RateInterval) -> TimeSpan {
        let mut ts = TimeSpan::new(at(from), at(to));
        ts.duration_index = Duration::seconds(to);
        ts.rate_interval = Some(ri.clone());
        ts.create_increments(1000);
        ts
    }

    #[test]
    fn test_create_increments() {
        let ts = priced(0, 60, &rate(dec!(2), 10, 1));
        assert_eq!(ts.increments.len(), 6);
        assert_eq!(ts.increments[0].cost, dec!(20));
        assert_eq!(ts.cost, dec!(120));
    }

    #[test]
    fn test_create_increments_last_is_shorter() {
        let ts = priced(0, 25, &rate(dec!(1), 10, 10));
        assert_eq!(ts.increments.len(), 3);
        assert_eq!(ts.increments[2].duration, Duration::seconds(5));
        assert_eq!(ts.increments.total_duration(), Duration::seconds(25));
        assert_eq!(ts.cost, dec!(3));
    }

    #[test]
    fn test_increment_ceiling_leaves_empty_set() {
        let mut ts = TimeSpan::new(at(0), at(3600));
        ts.rate_interval = Some(rate(dec!(1), 1, 1));
        assert!(!ts.create_increments(100));
        assert!(ts.increments.is_empty());
    }

    #[test]
    fn test_split_by_increment() {
        let mut ts = priced(0, 60, &rate(dec!(2), 10, 1));
        let tail = ts.split_by_increment(2).unwrap();
        assert_eq!(ts.time_end, at(20));
        assert_eq!(tail.time_start, at(20));
        assert_eq!(ts.increments.len(), 2);
        assert_eq!(tail.increments.len(), 4);
        assert_eq!(ts.duration_index, Duration::seconds(20));
        assert_eq!(tail.duration_index, Duration::seconds(60));
        assert_eq!(ts.cost + tail.cost, dec!(120));
        assert!(ts.split_by_increment(0).is_none());
        assert!(ts.split_by_increment(2).is_none());
    }

    #[test]
    fn test_split_by_duration_cuts_straddling_increment() {
        let mut ts = priced(0, 60, &rate(dec!(2), 10, 1));
        for inc in ts.increments.iter_mut() {
            inc.debit_info = DebitInfo {
                monetary: Some(MonetaryInfo {
                    uuid: "money".to_string(),
                    ..MonetaryInfo::default()
                }),
                account_id: "cgrates.org:rif".to_string(),
                ..DebitInfo::default()
            };
        }
        let tail = ts.split_by_duration(Duration::seconds(25)).unwrap();
        assert_eq!(ts.duration(), Duration::seconds(25));
        assert_eq!(tail.duration(), Duration::seconds(35));
        assert_eq!(ts.increments.len(), 3);
        assert_eq!(ts.increments[2].duration, Duration::seconds(5));
        assert_eq!(tail.increments[0].duration, Duration::seconds(5));
        assert_eq!(ts.increments[2].cost + tail.increments[0].cost, dec!(20));
        assert_eq!(tail.increments[0].debit_info.account_id, "cgrates.org:rif");
        assert_eq!(ts.cost + tail.cost, dec!(120));
    }

    #[test]
    fn test_split_by_duration_on_boundary() {
        let mut ts = priced(0, 60, &rate(dec!(2), 10, 1));
        let tail = ts.split_by_duration(Duration::seconds(50)).unwrap();
        assert_eq!(ts.increments.len(), 5);
        assert_eq!(tail.increments.len(), 1);
        assert!(ts.split_by_duration(Duration::seconds(50)).is_none());
    }

    #[test]
    fn test_set_new_duration_index_clamps() {
        let mut head = TimeSpan::new(at(0), at(10));
        head.duration_index = Duration::seconds(5);
        let tail = TimeSpan::new(at(10), at(30));
        head.set_new_duration_index(&tail);
        assert_eq!(head.duration_index, Duration::zero());
    }

    #[test]
    fn test_split_by_rate_interval_tier() {
        let mut ri = rate(dec!(0.2), 60, 60);
        ri.rating.rates.push(Rate {
            group_interval_start: Duration::seconds(60),
            value: dec!(0.1),
            rate_increment: Duration::seconds(1),
            rate_unit: Duration::seconds(60),
        });
        let mut ts = TimeSpan::new(at(0), at(90));
        let tail = ts.split_by_rate_interval(&ri, false).unwrap();
        assert_eq!(ts.duration(), Duration::seconds(60));
        assert_eq!(tail.group_start(), Duration::seconds(60));
        assert_eq!(tail.duration_index, Duration::seconds(90));
        assert!(tail.rate_interval.is_some());
    }

    #[test]
    fn test_split_by_rate_interval_timing() {
        let peak = RateInterval {
            timing: Some(RITiming {
                start_time: NaiveTime::from_hms_opt(10, 0, 0),
                end_time: NaiveTime::from_hms_opt(10, 49, 0),
                ..RITiming::default()
            }),
            ..rate(dec!(1), 1, 60)
        };
        let mut ts = TimeSpan::new(at(0), at(120));
        let tail = ts.split_by_rate_interval(&peak, false).unwrap();
        assert_eq!(ts.time_end, at(60));
        assert_eq!(ts.rate_interval.as_ref(), Some(&peak));
        assert!(tail.rate_interval.is_none());

        let off_peak = RateInterval {
            timing: Some(RITiming {
                start_time: NaiveTime::from_hms_opt(10, 49, 0),
                ..RITiming::default()
            }),
            ..rate(dec!(0.5), 1, 60)
        };
        let mut ts = TimeSpan::new(at(0), at(120));
        let tail = ts.split_by_rate_interval(&off_peak, false).unwrap();
        assert_eq!(tail.time_start, at(60));
        assert_eq!(tail.rate_interval.as_ref(), Some(&off_peak));
        assert!(ts.rate_interval.is_none());
    }

    #[test]
    fn test_split_by_rating_plan_and_day() {
        let mut ts = TimeSpan::new(at(0), at(120));
        let info = RatingInfo {
            matched_subject: "*out:cgrates.org:call:rif".to_string(),
            matched_prefix: "0723".to_string(),
            matched_dest_id: "NAT".to_string(),
            rating_plan_id: "RP_NEW".to_string(),
            activation_time: at(30),
        };
        let tail = ts.split_by_rating_plan(&info).unwrap();
        assert_eq!(ts.duration(), Duration::seconds(30));
        assert_eq!(tail.rating_plan_id, "RP_NEW");

        let start = Utc.with_ymd_and_hms(2013, 9, 24, 23, 59, 0).unwrap();
        let mut ts = TimeSpan::new(start, start + Duration::minutes(2));
        let tail = ts.split_by_day().unwrap();
        assert_eq!(ts.duration(), Duration::minutes(1));
        assert_eq!(tail.time_start, Utc.with_ymd_and_hms(2013, 9, 25, 0, 0, 0).unwrap());
        assert!(ts.split_by_day().is_none());
    }

    #[test]
    fn test_round_to_duration() {
        let mut ts = TimeSpan::new(at(0), at(10));
        ts.round_to_duration(Duration::minutes(1));
        assert_eq!(ts.duration(), Duration::minutes(1));
        assert_eq!(ts.duration_index, Duration::minutes(1));
    }

    #[test]
    fn test_merge_requires_same_rating() {
        let ri = rate(dec!(2), 10, 1);
        let mut spans = TimeSpans(vec![
            priced(0, 20, &ri),
            priced(20, 40, &ri),
            priced(40, 60, &rate(dec!(1), 10, 1)),
        ]);
        spans.merge();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].duration(), Duration::seconds(40));
        assert_eq!(spans[0].increments.len(), 4);
        assert_eq!(spans[0].duration_index, Duration::seconds(40));
    }

    #[test]
    fn test_remove_overlapped_from_index() {
        let ri = rate(dec!(1), 10, 1);
        let mut spans = TimeSpans(vec![
            priced(0, 60, &ri),
            priced(10, 20, &ri),
            priced(20, 80, &ri),
        ]);
        spans.remove_overlapped_from_index(0);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].time_start, at(60));
        assert_eq!(spans[1].duration(), Duration::seconds(20));
    }

    #[test]
    fn test_compress_spans() {
        let ri = rate(dec!(1), 10, 1);
        let mut spans = TimeSpans(vec![
            priced(0, 10, &ri),
            priced(10, 20, &ri),
            priced(20, 30, &ri),
        ]);
        let original = spans.clone();
        spans.compress();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].compress_factor, 3);
        assert_eq!(spans.total_cost(), original.total_cost());
        spans.decompress();
        assert_eq!(spans, original);
    }

    proptest! {
        #[test]
        fn split_then_merge_restores_totals(total in 2i64..120, cut in 1i64..119) {
            prop_assume!(cut < total);
            let original = priced(0, total, &rate(dec!(0.5), 10, 1));
            let mut head = original.clone();
            let tail = head.split_by_duration(Duration::seconds(cut)).unwrap();
            let mut spans = TimeSpans(vec![head, tail]);
            spans.merge();
            prop_assert_eq!(spans.total_duration(), original.duration());
            prop_assert_eq!(spans.total_cost(), original.cost);
            prop_assert_eq!(spans.last().map(|ts| ts.duration_index), Some(original.duration_index));
            if cut % 10 == 0 && total % 10 == 0 {
                prop_assert_eq!(spans.len(), 1);
            }
        }
    }
}
