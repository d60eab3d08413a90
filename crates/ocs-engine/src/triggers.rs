//! Action trigger runtime
//!
//! Triggers watch unit counters and balance values; a trigger whose
//! threshold is crossed fires once, runs its action set and stays executed
//! until re-armed.

use chrono::{DateTime, Utc};
use ocs_core::models::{Account, Action, ActionTrigger, ThresholdType};
use ocs_core::AppResult;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

use crate::Engine;

/// Whether `at`'s threshold is crossed on `account`.
///
/// Balance thresholds only look at the balances in `dirty`.
fn threshold_reached(
    account: &Account,
    at: &ActionTrigger,
    dirty: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> bool {
    if let Some(counter_type) = at.threshold_type.counter_type() {
        return account
            .unit_counters
            .get(&at.balance_type())
            .into_iter()
            .flatten()
            .filter(|uc| uc.counter_type == counter_type)
            .flat_map(|uc| uc.counters.iter())
            .any(|cf| {
                cf.filter.same_selection(&at.balance)
                    && at.threshold_type.crossed(cf.value, at.threshold_value)
            });
    }
    let balances = account.balances(at.balance_type());
    match at.threshold_type {
        ThresholdType::BalanceExpired => balances
            .iter()
            .any(|b| b.is_expired_at(now) && b.match_filter(&at.balance, false, true)),
        _ => balances
            .iter()
            .filter(|b| dirty.contains(&b.uuid) && !b.is_expired_at(now))
            .any(|b| {
                b.match_filter(&at.balance, false, false)
                    && at.threshold_type.crossed(b.value, at.threshold_value)
            }),
    }
}

impl Engine {
    /// Fire every armed trigger of `account` whose threshold is crossed.
    ///
    /// With `action` set only the triggers it addresses are considered.
    /// Failing actions are logged and skipped; expired triggers are pruned
    /// first and expired balances swept last.
    #[instrument(skip_all, fields(account = %account.id))]
    pub fn execute_action_triggers(
        &self,
        account: &mut Account,
        action: Option<&Action>,
        dirty: &BTreeSet<String>,
    ) -> AppResult<()> {
        let now = Utc::now();
        let before = account.action_triggers.len();
        account.action_triggers.retain(|at| !at.is_expired_at(now));
        if account.action_triggers.len() < before {
            debug!(
                "Pruned {} expired triggers",
                before - account.action_triggers.len()
            );
        }
        account.action_triggers.sort();

        for index in 0..account.action_triggers.len() {
            let at = &account.action_triggers[index];
            if !at.is_active_at(now) || !at.is_armed_at(now) || !at.matches_action(action) {
                continue;
            }
            if !threshold_reached(account, at, dirty, now) {
                continue;
            }
            let at = at.clone();
            account.action_triggers[index].mark_fired(now);
            info!(
                "Trigger {} fired on account {}: {:?} {}",
                at.unique_id, account.id, at.threshold_type, at.threshold_value
            );

            let mut actions = match self.stores.actions.get_actions(&at.actions_id) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(
                        "Could not get action set {} for trigger {}: {}",
                        at.actions_id, at.unique_id, e
                    );
                    continue;
                }
            };
            actions.sort_by(|a, b| b.weight.cmp(&a.weight));
            for a in &actions {
                let mut touched = BTreeSet::new();
                if let Err(e) = self.run_action(account, a, &mut touched, true) {
                    warn!(
                        "Action {} of set {} failed on account {}: {}",
                        a.id, at.actions_id, account.id, e
                    );
                }
            }
        }

        let removed = account.clean_expired_balances(now);
        if !removed.is_empty() {
            debug!("Swept {} expired balances", removed.len());
        }
        Ok(())
    }

    /// Re-arm the triggers `action` addresses (all when `None`), then run them
    pub fn reset_action_triggers(&self, account: &mut Account, action: Option<&Action>) -> AppResult<()> {
        rearm_triggers(account, action);
        self.execute_action_triggers(account, action, &BTreeSet::new())
    }

    /// Set the recurrent flag on the triggers `action` addresses
    pub fn set_recurrent(&self, account: &mut Account, action: Option<&Action>, recurrent: bool) {
        for at in account
            .action_triggers
            .iter_mut()
            .filter(|at| at.matches_action(action))
        {
            at.recurrent = recurrent;
        }
    }
}

pub(crate) fn rearm_triggers(account: &mut Account, action: Option<&Action>) {
    for at in account
        .action_triggers
        .iter_mut()
        .filter(|at| at.matches_action(action))
    {
        at.executed = false;
    }
}
