//! Pricing through the rating resolver

use chrono::{DateTime, Utc};
use ocs_core::models::{
    CallCost, CallDescriptor, Increment, RatingInfo, TimeSpan, TimeSpans, TrafficType,
};
use ocs_core::{AppError, AppResult};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::Engine;

/// Cut every span with `split` until it hands back no more tails
fn split_all<F>(spans: Vec<TimeSpan>, mut split: F) -> Vec<TimeSpan>
where
    F: FnMut(&mut TimeSpan) -> Option<TimeSpan>,
{
    let mut out = Vec::with_capacity(spans.len());
    for ts in spans {
        let mut next = Some(ts);
        while let Some(mut ts) = next.take() {
            next = split(&mut ts);
            out.push(ts);
        }
    }
    out
}

/// Apply the plan active at the session start, then cut at each later
/// activation
fn split_by_rating_plans(mut spans: Vec<TimeSpan>, infos: &[RatingInfo]) -> Vec<TimeSpan> {
    for info in infos {
        let Some(last) = spans.last_mut() else {
            break;
        };
        if info.activation_time <= last.time_start {
            last.set_rating_info(info);
        } else if let Some(tail) = last.split_by_rating_plan(info) {
            spans.push(tail);
        } else {
            break;
        }
    }
    spans
}

impl Engine {
    /// Price `cd` with its subject's rating.
    ///
    /// Voice sessions are cut at rating plan activations first. A rating
    /// with a timing window also cuts them at midnight, since windows are
    /// matched against the calendar day a span starts on. Rate tiers and
    /// window edges split the pieces last.
    #[instrument(skip(self, cd), fields(account = %cd.account, destination = %cd.destination))]
    pub fn rate_call(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let request = cd.rating_request(&cd.subject, cd.time_start, cd.time_end);
        let ri = self
            .stores
            .rating
            .resolve(&request)?
            .ok_or_else(|| AppError::RatingNotFound(cd.subject.clone()))?;

        let mut cc = cd.create_call_cost();
        cc.deduct_connect_fee = true;
        if cd.time_end <= cd.time_start {
            return Ok(cc);
        }

        let data = cd.tor != TrafficType::Voice;
        let mut first = TimeSpan::new(cd.time_start, cd.time_end);
        first.matched_subject = cd.subject.clone();
        let mut spans = vec![first];
        if !data {
            spans = split_by_rating_plans(spans, &cd.rating_infos);
            if ri.timing.is_some() {
                spans = split_all(spans, TimeSpan::split_by_day);
            }
        }
        let spans = split_all(spans, |ts| {
            let tail = ts.split_by_rate_interval(&ri, data);
            if ts.rate_interval.is_none() {
                ts.rate_interval = Some(ri.clone());
            }
            ts.cost = ts.calculate_cost();
            tail
        });

        cc.timespans = TimeSpans(spans);
        cc.update_cost(Decimal::ZERO);
        debug!(
            "Rated {} into {} spans costing {}",
            cd.destination,
            cc.timespans.len(),
            cc.cost
        );
        Ok(cc)
    }

    /// Price one increment with `subject`'s rating instead of the call's.
    ///
    /// `None` when the subject has no rating.
    pub(crate) fn rerate(
        &self,
        cd: &CallDescriptor,
        subject: &str,
        ts: &TimeSpan,
        inc_start: DateTime<Utc>,
        inc: &Increment,
    ) -> AppResult<Option<Decimal>> {
        let request = cd.rating_request(subject, inc_start, inc_start + inc.duration);
        let Some(ri) = self.stores.rating.resolve(&request)? else {
            warn!("No rating found for balance subject {}", subject);
            return Ok(None);
        };
        let offset = ts.group_start() + (inc_start - ts.time_start);
        Ok(Some(ri.get_cost(inc.duration, offset)))
    }
}
