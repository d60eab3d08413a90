//! Refunds of previous debits

use ocs_core::models::{Account, CallDescriptor, ResolvedDestination, TrafficType};
use ocs_core::{AppError, AppResult};
use tracing::{debug, instrument, warn};

use crate::ledger::{BalanceOwner, CountEvent, Ledger};
use crate::locker::AccountGuard;
use crate::Engine;

impl Engine {
    /// Credit back every increment of the debited session attached to `cd`
    /// to the balance recorded as its payer. Counters are decreased by the
    /// same amounts; connect fees stay charged.
    #[instrument(skip_all, fields(account = %account.id))]
    pub fn refund_increments(
        &self,
        account: &mut Account,
        cd: &CallDescriptor,
        guard: &AccountGuard<'_>,
    ) -> AppResult<()> {
        let cc = cd.call_cost.as_ref().ok_or(AppError::MissingCallCost)?;
        let destination = ResolvedDestination::resolve(
            self.stores.destinations.as_ref(),
            &cd.destination,
            self.config.min_prefix_match,
        )?;
        let mut spans = cc.timespans.clone();
        spans.decompress();

        let mut ledger = Ledger::new(account);
        let mut refunded = 0usize;
        for ts in spans.iter_mut() {
            ts.increments.decompress();
            for inc in ts.increments.iter() {
                let info = &inc.debit_info;
                if info.is_empty() {
                    continue;
                }
                let owner = if info.account_id.is_empty() {
                    BalanceOwner::Local
                } else {
                    ledger.load_member(&info.account_id, &self.stores, guard)?
                };

                if let Some(unit) = &info.unit {
                    let collection = [unit.tor, TrafficType::Generic]
                        .into_iter()
                        .find(|tor| ledger.balance(&owner, *tor, &unit.uuid).is_some());
                    match collection.and_then(|tor| ledger.balance_mut(&owner, tor, &unit.uuid).map(|b| (tor, b))) {
                        Some((tor, balance)) => {
                            balance.add_value(unit.consumed);
                            ledger.record(CountEvent {
                                owner: owner.clone(),
                                amount: -unit.consumed,
                                tor: cd.tor,
                                balance: Some((tor, unit.uuid.clone())),
                            });
                            refunded += 1;
                        }
                        None => warn!(
                            "Refund skipped: unit balance {} of {} not found",
                            unit.uuid, info.account_id
                        ),
                    }
                }

                if let Some(money) = &info.monetary {
                    match ledger.balance_mut(&owner, TrafficType::Monetary, &money.uuid) {
                        Some(balance) => {
                            let amount = if money.consumed.is_zero() {
                                inc.cost * balance.factor_for(cd.tor)
                            } else {
                                money.consumed
                            };
                            balance.add_value(amount);
                            ledger.record(CountEvent {
                                owner: owner.clone(),
                                amount: -amount,
                                tor: TrafficType::Monetary,
                                balance: Some((TrafficType::Monetary, money.uuid.clone())),
                            });
                            refunded += 1;
                        }
                        None => warn!(
                            "Refund skipped: money balance {} of {} not found",
                            money.uuid, info.account_id
                        ),
                    }
                }
            }
        }
        debug!("Refunded {} payments to {}", refunded, cd.account);
        self.settle(ledger, &cd.category, &destination)
    }
}
