//! Locked account operations
//!
//! Every operation here is one critical section: the charged account and
//! the members of its shared groups are locked together, the account is
//! reloaded under the lock, the engine runs and the result is stored.

use chrono::Duration;
use ocs_core::models::{Account, Action, CallDescriptor};
use ocs_core::{AppError, AppResult};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

use crate::debit::{DebitOptions, DebitOutcome};
use crate::locker::{AccountGuard, AccountLocker};
use crate::Engine;

/// Engine operations wrapped in per-account locking
pub struct AccountService {
    engine: Engine,
    locker: AccountLocker,
}

impl AccountService {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            locker: AccountLocker::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn locker(&self) -> &AccountLocker {
        &self.locker
    }

    /// Members of every shared group `account` pools a balance in
    fn members_of(&self, account: &Account) -> AppResult<BTreeSet<String>> {
        let mut members = BTreeSet::new();
        for group_id in account.shared_groups() {
            match self.engine.stores().shared_groups.get_shared_group(&group_id) {
                Ok(group) => members.extend(group.member_ids),
                Err(AppError::SharedGroupNotFound(_)) => {
                    warn!("Could not get shared group: {}", group_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(members)
    }

    /// Run `op` on `account_id` with it and its group members locked,
    /// storing the account afterwards unless `store` is false.
    fn with_account<T, F>(&self, account_id: &str, store: bool, op: F) -> AppResult<T>
    where
        F: FnOnce(&Engine, &mut Account, &AccountGuard<'_>) -> AppResult<T>,
    {
        let accounts = &self.engine.stores().accounts;
        let mut attempt = 0;
        loop {
            let members = self.members_of(&accounts.get_account(account_id)?)?;
            let keys = members
                .iter()
                .cloned()
                .chain(std::iter::once(account_id.to_string()));
            let guard = self.locker.lock(keys);

            let mut account = accounts.get_account(account_id)?;
            if self.members_of(&account)? != members {
                drop(guard);
                attempt += 1;
                if attempt >= self.engine.config().lock_retries {
                    return Err(AppError::Conflict(format!(
                        "shared group members of {} kept changing",
                        account_id
                    )));
                }
                debug!("Member set of {} changed, locking again", account_id);
                continue;
            }

            let result = op(&self.engine, &mut account, &guard)?;
            if store {
                accounts.set_account(&account)?;
            }
            return Ok(result);
        }
    }

    /// Debit `cd.account` for the session, pricing it first when no priced
    /// session is attached.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` / `AccountDisabled`
    /// - `RatingNotFound` when pricing is needed and the subject has no rating
    /// - `Conflict` when the shared-group member set never settles
    #[instrument(skip(self, cd), fields(account = %cd.account))]
    pub fn debit(&self, cd: &CallDescriptor, opts: DebitOptions) -> AppResult<DebitOutcome> {
        let mut cd = cd.clone();
        if cd.call_cost.is_none() {
            cd.call_cost = Some(self.engine.rate_call(&cd)?);
        }
        let outcome = self.with_account(&cd.account, !opts.dry_run, |engine, account, guard| {
            if account.disabled {
                return Err(AppError::AccountDisabled(account.id.clone()));
            }
            engine.debit_credit_balance(account, &cd, opts, guard)
        })?;
        if !opts.dry_run {
            info!(
                "Debited {} from {} for {}s",
                outcome.call_cost.cost,
                cd.account,
                outcome.call_cost.duration().num_seconds()
            );
        }
        Ok(outcome)
    }

    /// Longest part of the session the account can pay for right now
    pub fn max_session_duration(&self, cd: &CallDescriptor) -> AppResult<Duration> {
        let opts = DebitOptions {
            dry_run: true,
            force_duration: false,
        };
        Ok(self.debit(cd, opts)?.call_cost.duration())
    }

    pub fn refund(&self, cd: &CallDescriptor) -> AppResult<()> {
        self.with_account(&cd.account, true, |engine, account, guard| {
            engine.refund_increments(account, cd, guard)
        })
    }

    /// Apply `action`, then evaluate triggers on the balances it touched
    pub fn apply_action(&self, account_id: &str, action: &Action) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            let mut dirty = BTreeSet::new();
            engine.apply_action(account, action, &mut dirty)?;
            engine.execute_action_triggers(account, None, &dirty)
        })
    }

    pub fn execute_action_triggers(&self, account_id: &str, action: Option<&Action>) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            engine.execute_action_triggers(account, action, &BTreeSet::new())
        })
    }

    pub fn reset_action_triggers(&self, account_id: &str, action: Option<&Action>) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            engine.reset_action_triggers(account, action)
        })
    }

    pub fn set_recurrent(
        &self,
        account_id: &str,
        action: Option<&Action>,
        recurrent: bool,
    ) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            engine.set_recurrent(account, action, recurrent);
            Ok(())
        })
    }

    pub fn init_counters(&self, account_id: &str) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            engine.init_counters(account);
            Ok(())
        })
    }

    pub fn clean_expired_stuff(&self, account_id: &str) -> AppResult<()> {
        self.with_account(account_id, true, |engine, account, _| {
            engine.clean_expired_stuff(account);
            Ok(())
        })
    }

    pub fn get_account(&self, account_id: &str) -> AppResult<Account> {
        self.engine.stores().accounts.get_account(account_id)
    }
}
