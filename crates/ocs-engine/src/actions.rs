//! Balance and account actions
//!
//! Actions are run by fired triggers and by administrative calls. Every
//! balance an action touches is added to the caller's `dirty` set so balance
//! thresholds can be evaluated afterwards.

use chrono::Utc;
use ocs_core::consts::{DEFAULT_BALANCE_WEIGHT, META_DEFAULT};
use ocs_core::models::{
    Account, Action, ActionType, Balance, CounterFilter, TrafficType, UnitCounter, UnitCounters,
};
use ocs_core::{AppError, AppResult};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::triggers::rearm_triggers;
use crate::Engine;

impl Engine {
    /// Apply one action to `account`
    #[instrument(skip_all, fields(account = %account.id, action = ?action.action_type))]
    pub fn apply_action(
        &self,
        account: &mut Account,
        action: &Action,
        dirty: &mut BTreeSet<String>,
    ) -> AppResult<()> {
        self.run_action(account, action, dirty, false)
    }

    /// `from_trigger` is set when a fired trigger runs the action; trigger
    /// resets then only re-arm instead of evaluating again.
    pub(crate) fn run_action(
        &self,
        account: &mut Account,
        action: &Action,
        dirty: &mut BTreeSet<String>,
        from_trigger: bool,
    ) -> AppResult<()> {
        match action.action_type {
            ActionType::Topup => self.debit_balance_action(account, Some(&negated(action)), false, dirty),
            ActionType::TopupReset => {
                self.debit_balance_action(account, Some(&negated(action)), true, dirty)
            }
            ActionType::Debit => self.debit_balance_action(account, Some(action), false, dirty),
            ActionType::DebitReset => self.debit_balance_action(account, Some(action), true, dirty),
            ActionType::ResetTriggers => {
                if from_trigger {
                    rearm_triggers(account, Some(action));
                    Ok(())
                } else {
                    self.reset_action_triggers(account, Some(action))
                }
            }
            ActionType::SetRecurrent => {
                self.set_recurrent(account, Some(action), true);
                Ok(())
            }
            ActionType::UnsetRecurrent => {
                self.set_recurrent(account, Some(action), false);
                Ok(())
            }
            ActionType::ResetCounters => {
                account.unit_counters.reset_counters(action.balance.as_ref());
                Ok(())
            }
            ActionType::EnableBalance => toggle_balances(account, action, false, dirty),
            ActionType::DisableBalance => toggle_balances(account, action, true, dirty),
            ActionType::AllowNegative => {
                account.allow_negative = true;
                Ok(())
            }
            ActionType::DenyNegative => {
                account.allow_negative = false;
                Ok(())
            }
            ActionType::EnableAccount => {
                account.disabled = false;
                Ok(())
            }
            ActionType::DisableAccount => {
                account.disabled = true;
                Ok(())
            }
            ActionType::Log => {
                info!(
                    "Account {} balances: {}",
                    account.id,
                    serde_json::to_string(&account.balance_map)?
                );
                Ok(())
            }
        }
    }

    /// Subtract the action's amount from every matching balance, zeroing
    /// them first when `reset`. Without a match a balance is created from
    /// the filter. Top-ups go through here with a negated amount.
    ///
    /// # Errors
    ///
    /// `NilAction` without an action, `NilBalance` without a balance filter.
    pub fn debit_balance_action(
        &self,
        account: &mut Account,
        action: Option<&Action>,
        reset: bool,
        dirty: &mut BTreeSet<String>,
    ) -> AppResult<()> {
        let action = action.ok_or(AppError::NilAction)?;
        let filter = action.balance.as_ref().ok_or(AppError::NilBalance)?;
        let tor = filter.balance_type();
        let amount = filter.value();
        let now = Utc::now();

        let mut found = false;
        for b in account.balances_mut(tor).iter_mut() {
            if b.is_expired_at(now) || !b.match_filter(filter, false, false) {
                continue;
            }
            if reset {
                b.value = Decimal::ZERO;
            }
            b.subtract_value(amount);
            dirty.insert(b.uuid.clone());
            found = true;
        }

        if !found {
            let balance = if filter.id.as_deref() == Some(META_DEFAULT) {
                Balance {
                    uuid: Uuid::new_v4().to_string(),
                    id: META_DEFAULT.to_string(),
                    value: -amount,
                    weight: Decimal::from(DEFAULT_BALANCE_WEIGHT),
                    ..Balance::default()
                }
            } else {
                let mut created = filter.create_balance();
                created.value = -amount;
                created
            };
            debug!(
                "Created {} balance {} on account {}",
                tor, balance.uuid, account.id
            );
            dirty.insert(balance.uuid.clone());
            account.balances_mut(tor).push(balance);
        }

        if let Some(groups) = &filter.shared_groups {
            self.enrol_in_shared_groups(&account.id, groups)?;
        }
        Ok(())
    }

    fn enrol_in_shared_groups(&self, account_id: &str, groups: &BTreeSet<String>) -> AppResult<()> {
        for group_id in groups {
            let mut group = match self.stores.shared_groups.get_shared_group(group_id) {
                Ok(group) => group,
                Err(AppError::SharedGroupNotFound(_)) => {
                    warn!("Could not get shared group: {}", group_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if group.member_ids.insert(account_id.to_string()) {
                self.stores.shared_groups.set_shared_group(&group)?;
                info!("Account {} joined shared group {}", account_id, group_id);
            }
        }
        Ok(())
    }

    /// Rebuild the counters from the counter triggers, one filter per
    /// distinct trigger filter, keeping the values of surviving filters.
    pub fn init_counters(&self, account: &mut Account) {
        let old = std::mem::take(&mut account.unit_counters);
        let mut counters = UnitCounters::default();
        for at in account.action_triggers.iter() {
            let Some(counter_type) = at.threshold_type.counter_type() else {
                continue;
            };
            let tor = at.balance_type();
            let per_type = counters.entry(tor).or_insert_with(Vec::new);
            let index = match per_type.iter().position(|uc| uc.counter_type == counter_type) {
                Some(index) => index,
                None => {
                    per_type.push(UnitCounter {
                        counter_type,
                        counters: Vec::new(),
                    });
                    per_type.len() - 1
                }
            };
            let unit_counter = &mut per_type[index];
            if unit_counter
                .counters
                .iter()
                .any(|cf| cf.filter.same_selection(&at.balance))
            {
                continue;
            }
            unit_counter.counters.push(CounterFilter {
                value: old
                    .value_of(tor, counter_type, &at.balance)
                    .unwrap_or_default(),
                filter: at.balance.clone(),
            });
        }
        account.unit_counters = counters;
    }

    /// Remove expired balances and expired triggers
    pub fn clean_expired_stuff(&self, account: &mut Account) {
        let now = Utc::now();
        let removed = account.clean_expired_balances(now);
        let before = account.action_triggers.len();
        account.action_triggers.retain(|at| !at.is_expired_at(now));
        debug!(
            "Removed {} expired balances and {} expired triggers from {}",
            removed.len(),
            before - account.action_triggers.len(),
            account.id
        );
    }
}

/// Copy of `action` with its amount negated
fn negated(action: &Action) -> Action {
    let mut action = action.clone();
    if let Some(filter) = action.balance.as_mut() {
        filter.value = filter.value.map(|value| -value);
    }
    action
}

/// Set `disabled` on the balances the filter selects among those in the
/// opposite state
fn toggle_balances(
    account: &mut Account,
    action: &Action,
    disabled: bool,
    dirty: &mut BTreeSet<String>,
) -> AppResult<()> {
    let mut filter = action.balance.clone().ok_or(AppError::NilBalance)?;
    filter.disabled = Some(!disabled);
    let tor: TrafficType = filter.balance_type();
    let mut found = false;
    for b in account.balances_mut(tor).iter_mut() {
        if b.match_filter(&filter, false, false) {
            b.disabled = disabled;
            dirty.insert(b.uuid.clone());
            found = true;
        }
    }
    if !found {
        return Err(AppError::BalanceNotFound(format!(
            "no {} balance of {} to {}",
            tor,
            account.id,
            if disabled { "disable" } else { "enable" }
        )));
    }
    Ok(())
}
