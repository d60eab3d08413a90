//! Debit-credit engine
//!
//! Walks the increments of a priced session in order and settles each one
//! against the first candidate balance able to pay it: unit balances first,
//! then money balances. Flat rating subjects (`*zero1s`, `*zero1m`) re-slice
//! the session into whole chunks paid in one go.

use chrono::{DateTime, Duration, Utc};
use ocs_core::models::{
    Account, CallCost, CallDescriptor, DebitInfo, Increment, MonetaryInfo, RatingSubject,
    ResolvedDestination, TimeSpan, TimeSpans, TrafficType, UnitInfo,
};
use ocs_core::utils;
use ocs_core::{AppError, AppResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::ledger::{BalanceOwner, CountEvent, Ledger};
use crate::locker::AccountGuard;
use crate::selection::BalanceCandidate;
use crate::Engine;

/// Debit switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitOptions {
    /// Work on copies: nothing is stored, counters and triggers stay put
    #[serde(default)]
    pub dry_run: bool,
    /// Bill the unaffordable remainder to the default balance instead of
    /// truncating the session
    #[serde(default)]
    pub force_duration: bool,
}

/// Result of a debit: the priced session and, when part of it could not
/// be paid from the balances, the insufficient-credit error
#[derive(Debug, Clone, PartialEq)]
pub struct DebitOutcome {
    pub call_cost: CallCost,
    pub insufficient_credit: Option<AppError>,
}

impl DebitOutcome {
    pub fn is_complete(&self) -> bool {
        self.insufficient_credit.is_none()
    }
}

enum Step {
    Paid,
    /// A flat subject paid a whole new span at this index
    Resliced(usize),
    Blocked,
    Unpaid,
}

enum Attempt {
    Paid,
    Short,
    Skip,
}

enum Stop {
    Blocked,
    Unpaid,
}

struct Walk<'c> {
    cd: &'c CallDescriptor,
    units: Vec<BalanceCandidate>,
    money: Vec<BalanceCandidate>,
    fee: Decimal,
    fee_pending: bool,
    fee_charged: bool,
    /// No increment settled yet
    first: bool,
}

impl Walk<'_> {
    /// Connect fee due with the increment being paid
    fn fee_due(&self) -> Decimal {
        if self.fee_pending && self.first {
            self.fee
        } else {
            Decimal::ZERO
        }
    }
}

fn count(
    ledger: &mut Ledger<'_>,
    owner: &BalanceOwner,
    amount: Decimal,
    tor: TrafficType,
    balance: Option<(TrafficType, &str)>,
) {
    ledger.record(CountEvent {
        owner: owner.clone(),
        amount,
        tor,
        balance: balance.map(|(collection, uuid)| (collection, uuid.to_string())),
    });
}

/// Drop everything from increment `ii` of span `si` on
fn truncate(spans: &mut TimeSpans, si: usize, ii: usize) {
    if ii > 0 && si < spans.len() {
        let _ = spans[si].split_by_increment(ii);
        spans.truncate(si + 1);
    } else {
        spans.truncate(si);
    }
}

/// Whole chunks of `per_chunk` that `value` covers, saturating when the
/// count does not fit an i64
fn affordable_chunks(value: Decimal, per_chunk: Decimal) -> i64 {
    if value <= Decimal::ZERO || per_chunk <= Decimal::ZERO {
        return 0;
    }
    value
        .checked_div(per_chunk)
        .and_then(|chunks| chunks.floor().to_i64())
        .unwrap_or(i64::MAX)
}

/// Cost of everything from increment `ii` of span `si` on
fn unpaid_cost(spans: &TimeSpans, si: usize, ii: usize) -> Decimal {
    spans
        .iter()
        .enumerate()
        .skip(si)
        .map(|(k, ts)| {
            if ts.increments.is_empty() {
                ts.cost
            } else {
                let skip = if k == si { ii } else { 0 };
                ts.increments.iter().skip(skip).map(|inc| inc.cost).sum()
            }
        })
        .sum()
}

impl Engine {
    /// Consume `account`'s balances (and its shared groups') against the
    /// priced session attached to `cd`.
    ///
    /// # Errors
    ///
    /// - `MissingCallCost` when `cd` carries no priced session
    /// - `LockNotHeld` when a shared-group member is not covered by `guard`
    /// - store errors from loading members or shared groups
    ///
    /// Insufficient credit is not an error here: it is reported in
    /// [`DebitOutcome::insufficient_credit`] next to the priced result.
    #[instrument(skip_all, fields(account = %account.id, destination = %cd.destination))]
    pub fn debit_credit_balance(
        &self,
        account: &mut Account,
        cd: &CallDescriptor,
        opts: DebitOptions,
        guard: &AccountGuard<'_>,
    ) -> AppResult<DebitOutcome> {
        let cc = cd.call_cost.clone().ok_or(AppError::MissingCallCost)?;
        if opts.dry_run {
            let mut copy = account.clone();
            return self.debit_pass(&mut copy, cd, cc, opts, guard);
        }
        self.debit_pass(account, cd, cc, opts, guard)
    }

    fn debit_pass(
        &self,
        account: &mut Account,
        cd: &CallDescriptor,
        mut cc: CallCost,
        opts: DebitOptions,
        guard: &AccountGuard<'_>,
    ) -> AppResult<DebitOutcome> {
        let now = Utc::now();
        let destination = ResolvedDestination::resolve(
            self.stores.destinations.as_ref(),
            &cd.destination,
            self.config.min_prefix_match,
        )?;
        let mut ledger = Ledger::new(account);
        let units = if cd.tor == TrafficType::Monetary {
            Vec::new()
        } else {
            self.select_candidates(&mut ledger, cd.tor, &cd.category, &destination, guard, now)?
        };
        let money = self.select_candidates(
            &mut ledger,
            TrafficType::Monetary,
            &cd.category,
            &destination,
            guard,
            now,
        )?;

        let fee = if cc.deduct_connect_fee {
            cc.connect_fee()
        } else {
            Decimal::ZERO
        };
        let mut spans = std::mem::take(&mut cc.timespans);
        spans.decompress();
        for ts in spans.iter_mut() {
            ts.increments.decompress();
            ts.create_increments(self.config.max_increments);
        }
        let mut walk = Walk {
            cd,
            units,
            money,
            fee,
            fee_pending: fee > Decimal::ZERO,
            fee_charged: false,
            first: true,
        };

        let mut insufficient_credit = None;
        match self.walk(&mut ledger, &mut walk, &mut spans)? {
            None => {}
            Some((Stop::Blocked, si, ii)) => {
                debug!("Blocker balance stopped the debit at span {} increment {}", si, ii);
                truncate(&mut spans, si, ii);
            }
            Some((Stop::Unpaid, si, ii)) => {
                let unpaid = unpaid_cost(&spans, si, ii);
                let allow_negative = ledger.initiator().allow_negative;
                if opts.force_duration || allow_negative {
                    if !allow_negative && !opts.dry_run {
                        warn!(
                            "Going negative on account {} with allow_negative: false",
                            ledger.initiator().id
                        );
                    }
                    self.go_negative(&mut ledger, &mut walk, &mut spans, si, ii);
                } else {
                    truncate(&mut spans, si, ii);
                }
                warn!(
                    "Not enough credit on account {}: {} left unpaid",
                    ledger.initiator().id,
                    unpaid
                );
                insufficient_credit = Some(AppError::InsufficientCredit {
                    account: ledger.initiator().id.clone(),
                    unpaid,
                });
            }
        }

        if walk.fee_pending && !spans.is_empty() {
            self.debit_connect_fee(&mut ledger, &mut walk);
        }

        spans.merge();
        for ts in spans.iter_mut() {
            ts.increments.compress();
        }
        cc.timespans = spans;
        let charged_fee = if walk.fee_charged { walk.fee } else { Decimal::ZERO };
        cc.update_cost(charged_fee);
        cc.cost = cc.cost.round_dp(self.config.rounding_decimals);

        if !opts.dry_run {
            self.settle(ledger, &cd.category, &destination)?;
        }
        debug!(
            "Debited {} over {} spans from account {}",
            cc.cost,
            cc.timespans.len(),
            cd.account
        );
        Ok(DebitOutcome {
            call_cost: cc,
            insufficient_credit,
        })
    }

    /// Pay increments in order; the position of the first one left unpaid
    fn walk(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &mut Walk<'_>,
        spans: &mut TimeSpans,
    ) -> AppResult<Option<(Stop, usize, usize)>> {
        let mut si = 0;
        'spans: while si < spans.len() {
            let mut ii = 0;
            let mut inc_start = spans[si].time_start;
            while ii < spans[si].increments.len() {
                match self.pay_increment(ledger, walk, spans, si, ii, inc_start)? {
                    Step::Paid => {
                        inc_start = inc_start + spans[si].increments[ii].duration;
                        ii += 1;
                    }
                    Step::Resliced(paid) => {
                        si = paid + 1;
                        continue 'spans;
                    }
                    Step::Blocked => return Ok(Some((Stop::Blocked, si, ii))),
                    Step::Unpaid => return Ok(Some((Stop::Unpaid, si, ii))),
                }
            }
            // no increments (ceiling exceeded) but still priced
            if spans[si].increments.is_empty() && spans[si].cost > Decimal::ZERO {
                if let Some(stop) = self.pay_span(ledger, walk, &spans[si]) {
                    return Ok(Some((stop, si, 0)));
                }
            }
            si += 1;
        }
        Ok(None)
    }

    fn pay_increment(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &mut Walk<'_>,
        spans: &mut TimeSpans,
        si: usize,
        ii: usize,
        inc_start: DateTime<Utc>,
    ) -> AppResult<Step> {
        for k in 0..walk.units.len() {
            let candidate = walk.units[k].clone();
            let attempt = match candidate.subject.chunk() {
                Some(chunk) => {
                    if let Some(paid) =
                        self.pay_flat(ledger, walk, spans, si, ii, inc_start, &candidate, chunk)
                    {
                        return Ok(Step::Resliced(paid));
                    }
                    Attempt::Short
                }
                None => self.pay_units(ledger, walk, &mut spans[si], ii, inc_start, &candidate)?,
            };
            match attempt {
                Attempt::Paid => {
                    walk.first = false;
                    return Ok(Step::Paid);
                }
                Attempt::Short if candidate.blocker => return Ok(Step::Blocked),
                _ => {}
            }
        }
        for k in 0..walk.money.len() {
            let candidate = walk.money[k].clone();
            match self.pay_money(ledger, walk, &mut spans[si], ii, inc_start, &candidate)? {
                Attempt::Paid => {
                    walk.first = false;
                    return Ok(Step::Paid);
                }
                Attempt::Short if candidate.blocker => return Ok(Step::Blocked),
                _ => {}
            }
        }
        if spans[si].increments[ii].cost.is_zero() {
            walk.first = false;
            return Ok(Step::Paid);
        }
        Ok(Step::Unpaid)
    }

    /// Pay whole chunks from a flat-subject unit balance, starting at the
    /// increment `ii` of span `si` and rounding the usage up to a chunk.
    ///
    /// Returns the index of the new paid span.
    #[allow(clippy::too_many_arguments)]
    fn pay_flat(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &Walk<'_>,
        spans: &mut TimeSpans,
        si: usize,
        ii: usize,
        inc_start: DateTime<Utc>,
        candidate: &BalanceCandidate,
        chunk: Duration,
    ) -> Option<usize> {
        let cd = walk.cd;
        let balance = ledger.balance(&candidate.owner, candidate.tor, &candidate.uuid)?;
        let per_chunk = cd.tor.usage_units(chunk) * balance.factor_for(cd.tor);
        if per_chunk <= Decimal::ZERO {
            return None;
        }
        let session_end = spans.last()?.time_end;
        let needed = utils::ceil_div(session_end - inc_start, chunk);
        let n = needed.min(affordable_chunks(balance.value, per_chunk));
        if n <= 0 {
            return None;
        }
        let (balance_id, mut value) = (balance.id.clone(), balance.value);

        let mut at = si;
        if ii > 0 {
            if let Some(tail) = spans[si].split_by_increment(ii) {
                spans.insert(si + 1, tail);
                at = si + 1;
            }
        }
        let base = &spans[at];
        let mut paid = TimeSpan::new(inc_start, inc_start + utils::times(chunk, n));
        paid.rate_interval = base.rate_interval.clone();
        paid.matched_subject = base.matched_subject.clone();
        paid.matched_prefix = base.matched_prefix.clone();
        paid.matched_dest_id = base.matched_dest_id.clone();
        paid.rating_plan_id = base.rating_plan_id.clone();
        paid.duration_index = base.group_start() + utils::times(chunk, n);

        let account_id = ledger.owner_id(&candidate.owner);
        let mut increments = Vec::with_capacity(n as usize);
        for _ in 0..n {
            value -= per_chunk;
            increments.push(Increment {
                debit_info: DebitInfo {
                    unit: Some(UnitInfo {
                        uuid: candidate.uuid.clone(),
                        id: balance_id.clone(),
                        value,
                        consumed: per_chunk,
                        tor: candidate.tor,
                    }),
                    monetary: None,
                    account_id: account_id.clone(),
                },
                ..Increment::new(chunk, Decimal::ZERO)
            });
        }
        paid.increments = increments.into();

        let total = per_chunk * Decimal::from(n);
        ledger
            .balance_mut(&candidate.owner, candidate.tor, &candidate.uuid)?
            .subtract_value(total);
        count(
            ledger,
            &candidate.owner,
            total,
            cd.tor,
            Some((candidate.tor, &candidate.uuid)),
        );

        spans.insert(at, paid);
        spans.remove_overlapped_from_index(at);
        debug!(
            "Flat balance {} paid {} chunks of {}s from {}",
            candidate.uuid,
            n,
            chunk.num_seconds(),
            inc_start
        );
        Some(at)
    }

    /// Pay one increment in units; a custom rating subject also charges its
    /// re-rated cost to a money balance of the same owner.
    fn pay_units(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &Walk<'_>,
        ts: &mut TimeSpan,
        ii: usize,
        inc_start: DateTime<Utc>,
        candidate: &BalanceCandidate,
    ) -> AppResult<Attempt> {
        let cd = walk.cd;
        let Some(balance) = ledger.balance(&candidate.owner, candidate.tor, &candidate.uuid) else {
            return Ok(Attempt::Skip);
        };
        let units = cd.tor.usage_units(ts.increments[ii].duration) * balance.factor_for(cd.tor);
        if balance.value < units {
            return Ok(Attempt::Short);
        }
        let balance_id = balance.id.clone();

        let mut money_payer: Option<(BalanceCandidate, Decimal, Decimal)> = None;
        if let RatingSubject::Custom(subject) = &candidate.subject {
            let Some(cost) = self.rerate(cd, subject, ts, inc_start, &ts.increments[ii])? else {
                return Ok(Attempt::Short);
            };
            if cost > Decimal::ZERO {
                for money in walk.money.iter().filter(|m| m.owner == candidate.owner) {
                    if let Some(b) = ledger.balance(&money.owner, money.tor, &money.uuid) {
                        let amount = cost * b.factor_for(cd.tor);
                        if b.value >= amount {
                            money_payer = Some((money.clone(), cost, amount));
                            break;
                        }
                    }
                }
                if money_payer.is_none() {
                    return Ok(Attempt::Short);
                }
            }
        }

        let account_id = ledger.owner_id(&candidate.owner);
        let Some(balance) = ledger.balance_mut(&candidate.owner, candidate.tor, &candidate.uuid)
        else {
            return Ok(Attempt::Skip);
        };
        balance.subtract_value(units);
        let unit_info = UnitInfo {
            uuid: candidate.uuid.clone(),
            id: balance_id,
            value: balance.value,
            consumed: units,
            tor: candidate.tor,
        };
        count(
            ledger,
            &candidate.owner,
            units,
            cd.tor,
            Some((candidate.tor, &candidate.uuid)),
        );

        let mut monetary_info = None;
        let mut cost = Decimal::ZERO;
        if let Some((money, rerated, amount)) = money_payer {
            if let Some(b) = ledger.balance_mut(&money.owner, money.tor, &money.uuid) {
                b.subtract_value(amount);
                monetary_info = Some(MonetaryInfo {
                    uuid: b.uuid.clone(),
                    id: b.id.clone(),
                    value: b.value,
                    consumed: amount,
                });
                cost = rerated;
            }
            count(
                ledger,
                &money.owner,
                amount,
                TrafficType::Monetary,
                Some((money.tor, &money.uuid)),
            );
        }

        let inc = &mut ts.increments[ii];
        inc.cost = cost;
        inc.debit_info = DebitInfo {
            unit: Some(unit_info),
            monetary: monetary_info,
            account_id,
        };
        Ok(Attempt::Paid)
    }

    /// Pay one increment, and the connect fee when due, from a money balance
    fn pay_money(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &mut Walk<'_>,
        ts: &mut TimeSpan,
        ii: usize,
        inc_start: DateTime<Utc>,
        candidate: &BalanceCandidate,
    ) -> AppResult<Attempt> {
        let cd = walk.cd;
        let Some(balance) = ledger.balance(&candidate.owner, candidate.tor, &candidate.uuid) else {
            return Ok(Attempt::Skip);
        };
        let factor = balance.factor_for(cd.tor);
        let value = balance.value;
        let cost = match &candidate.subject {
            RatingSubject::Custom(subject) => {
                match self.rerate(cd, subject, ts, inc_start, &ts.increments[ii])? {
                    Some(cost) => cost,
                    None => return Ok(Attempt::Short),
                }
            }
            _ => ts.increments[ii].cost,
        };
        let fee = walk.fee_due();
        let amount = cost * factor + fee;
        if amount.is_zero() {
            return Ok(Attempt::Skip);
        }
        if value < amount {
            return Ok(Attempt::Short);
        }

        let account_id = ledger.owner_id(&candidate.owner);
        let Some(balance) = ledger.balance_mut(&candidate.owner, candidate.tor, &candidate.uuid)
        else {
            return Ok(Attempt::Skip);
        };
        balance.subtract_value(amount);
        let info = MonetaryInfo {
            uuid: balance.uuid.clone(),
            id: balance.id.clone(),
            value: balance.value,
            consumed: cost * factor,
        };
        count(
            ledger,
            &candidate.owner,
            cost * factor,
            TrafficType::Monetary,
            Some((candidate.tor, &candidate.uuid)),
        );
        if fee > Decimal::ZERO {
            count(
                ledger,
                &candidate.owner,
                fee,
                TrafficType::Monetary,
                Some((candidate.tor, &candidate.uuid)),
            );
            walk.fee_pending = false;
            walk.fee_charged = true;
        }

        let inc = &mut ts.increments[ii];
        inc.cost = cost;
        inc.debit_info = DebitInfo {
            unit: None,
            monetary: Some(info),
            account_id,
        };
        Ok(Attempt::Paid)
    }

    /// Pay a span left without increments as one amount from the first
    /// money balance holding enough
    fn pay_span(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &mut Walk<'_>,
        ts: &TimeSpan,
    ) -> Option<Stop> {
        let fee = walk.fee_due();
        for k in 0..walk.money.len() {
            let candidate = walk.money[k].clone();
            let Some(balance) = ledger.balance(&candidate.owner, candidate.tor, &candidate.uuid)
            else {
                continue;
            };
            let cost = ts.cost * balance.factor_for(walk.cd.tor);
            if balance.value < cost + fee {
                if candidate.blocker {
                    return Some(Stop::Blocked);
                }
                continue;
            }
            if let Some(balance) =
                ledger.balance_mut(&candidate.owner, candidate.tor, &candidate.uuid)
            {
                balance.subtract_value(cost + fee);
            }
            count(
                ledger,
                &candidate.owner,
                cost,
                TrafficType::Monetary,
                Some((candidate.tor, &candidate.uuid)),
            );
            if fee > Decimal::ZERO {
                count(
                    ledger,
                    &candidate.owner,
                    fee,
                    TrafficType::Monetary,
                    Some((candidate.tor, &candidate.uuid)),
                );
                walk.fee_pending = false;
                walk.fee_charged = true;
            }
            walk.first = false;
            debug!(
                "Balance {} paid {} for the whole span {} - {}",
                candidate.uuid, cost, ts.time_start, ts.time_end
            );
            return None;
        }
        Some(Stop::Unpaid)
    }

    /// Bill everything from increment `ii` of span `si` on to the initiator's
    /// default balance
    fn go_negative(
        &self,
        ledger: &mut Ledger<'_>,
        walk: &mut Walk<'_>,
        spans: &mut TimeSpans,
        si: usize,
        ii: usize,
    ) {
        let account_id = ledger.initiator().id.clone();
        for (k, ts) in spans.iter_mut().enumerate().skip(si) {
            if ts.increments.is_empty() {
                let default = ledger.default_balance_mut();
                default.subtract_value(ts.cost);
                let uuid = default.uuid.clone();
                count(
                    ledger,
                    &BalanceOwner::Local,
                    ts.cost,
                    TrafficType::Monetary,
                    Some((TrafficType::Monetary, &uuid)),
                );
                continue;
            }
            let skip = if k == si { ii } else { 0 };
            for inc in ts.increments.iter_mut().skip(skip) {
                let fee = walk.fee_due();
                let default = ledger.default_balance_mut();
                default.subtract_value(inc.cost + fee);
                let info = MonetaryInfo {
                    uuid: default.uuid.clone(),
                    id: default.id.clone(),
                    value: default.value,
                    consumed: inc.cost,
                };
                count(
                    ledger,
                    &BalanceOwner::Local,
                    inc.cost + fee,
                    TrafficType::Monetary,
                    Some((TrafficType::Monetary, &info.uuid)),
                );
                if fee > Decimal::ZERO {
                    walk.fee_pending = false;
                    walk.fee_charged = true;
                }
                walk.first = false;
                inc.debit_info = DebitInfo {
                    unit: None,
                    monetary: Some(info),
                    account_id: account_id.clone(),
                };
            }
        }
    }

    /// Pay a still pending connect fee from the first money balance holding
    /// enough, else from the default balance going negative
    fn debit_connect_fee(&self, ledger: &mut Ledger<'_>, walk: &mut Walk<'_>) {
        let fee = walk.fee;
        let payer = walk
            .money
            .iter()
            .find(|m| {
                ledger
                    .balance(&m.owner, m.tor, &m.uuid)
                    .is_some_and(|b| b.value >= fee)
            })
            .cloned();
        match payer {
            Some(money) => {
                if let Some(b) = ledger.balance_mut(&money.owner, money.tor, &money.uuid) {
                    b.subtract_value(fee);
                }
                count(
                    ledger,
                    &money.owner,
                    fee,
                    TrafficType::Monetary,
                    Some((money.tor, &money.uuid)),
                );
            }
            None => {
                let default = ledger.default_balance_mut();
                default.subtract_value(fee);
                let uuid = default.uuid.clone();
                info!(
                    "Connect fee {} taken from the default balance of {}",
                    fee,
                    ledger.initiator().id
                );
                count(
                    ledger,
                    &BalanceOwner::Local,
                    fee,
                    TrafficType::Monetary,
                    Some((TrafficType::Monetary, &uuid)),
                );
            }
        }
        walk.fee_pending = false;
        walk.fee_charged = true;
    }
}
