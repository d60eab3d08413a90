//! Working set of accounts touched by one engine operation
//!
//! The initiating account is borrowed from the caller; shared-group members
//! are loaded into the ledger as owned values and handed back to the store
//! when the operation settles.

use ocs_core::models::{Account, Balance, ResolvedDestination, TrafficType};
use ocs_core::{AppError, AppResult};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::locker::AccountGuard;
use crate::{Engine, Stores};

/// Account owning a balance within a ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BalanceOwner {
    /// The initiating account
    Local,
    /// A shared-group member, by account id
    Member(String),
}

/// Usage to record on a counter once the operation settles
#[derive(Debug, Clone)]
pub(crate) struct CountEvent {
    pub owner: BalanceOwner,
    pub amount: Decimal,
    /// Traffic type the usage is counted under
    pub tor: TrafficType,
    /// Paying balance, by collection and uuid
    pub balance: Option<(TrafficType, String)>,
}

pub struct Ledger<'a> {
    initiator: &'a mut Account,
    members: BTreeMap<String, Account>,
    dirty: BTreeMap<BalanceOwner, BTreeSet<String>>,
    events: Vec<CountEvent>,
}

impl<'a> Ledger<'a> {
    pub fn new(initiator: &'a mut Account) -> Self {
        Self {
            initiator,
            members: BTreeMap::new(),
            dirty: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn initiator(&self) -> &Account {
        &*self.initiator
    }

    pub fn owner_for(&self, account_id: &str) -> BalanceOwner {
        if account_id == self.initiator.id {
            BalanceOwner::Local
        } else {
            BalanceOwner::Member(account_id.to_string())
        }
    }

    pub fn owner_id(&self, owner: &BalanceOwner) -> String {
        match owner {
            BalanceOwner::Local => self.initiator.id.clone(),
            BalanceOwner::Member(id) => id.clone(),
        }
    }

    /// Load member `account_id` once; it must be covered by `guard`
    pub fn load_member(
        &mut self,
        account_id: &str,
        stores: &Stores,
        guard: &AccountGuard<'_>,
    ) -> AppResult<BalanceOwner> {
        let owner = self.owner_for(account_id);
        if owner == BalanceOwner::Local || self.members.contains_key(account_id) {
            return Ok(owner);
        }
        if !guard.covers(account_id) {
            return Err(AppError::LockNotHeld(account_id.to_string()));
        }
        let account = stores.accounts.get_account(account_id)?;
        debug!("Loaded shared group member {}", account_id);
        self.members.insert(account_id.to_string(), account);
        Ok(owner)
    }

    pub fn account(&self, owner: &BalanceOwner) -> Option<&Account> {
        match owner {
            BalanceOwner::Local => Some(&*self.initiator),
            BalanceOwner::Member(id) => self.members.get(id),
        }
    }

    pub fn balance(&self, owner: &BalanceOwner, tor: TrafficType, uuid: &str) -> Option<&Balance> {
        self.account(owner)?.find_balance(tor, uuid)
    }

    /// Mutable balance, marked as touched by this operation
    pub fn balance_mut(
        &mut self,
        owner: &BalanceOwner,
        tor: TrafficType,
        uuid: &str,
    ) -> Option<&mut Balance> {
        self.dirty
            .entry(owner.clone())
            .or_default()
            .insert(uuid.to_string());
        let account = match owner {
            BalanceOwner::Local => &mut *self.initiator,
            BalanceOwner::Member(id) => self.members.get_mut(id)?,
        };
        account.find_balance_mut(tor, uuid)
    }

    /// The initiator's default money balance, marked as touched
    pub fn default_balance_mut(&mut self) -> &mut Balance {
        let balance = self.initiator.default_money_balance();
        self.dirty
            .entry(BalanceOwner::Local)
            .or_default()
            .insert(balance.uuid.clone());
        balance
    }

    pub(crate) fn record(&mut self, event: CountEvent) {
        self.events.push(event);
    }
}

impl Engine {
    /// Count recorded usage, run triggers on every touched account and store
    /// the shared-group members.
    pub(crate) fn settle(
        &self,
        ledger: Ledger<'_>,
        category: &str,
        destination: &ResolvedDestination,
    ) -> AppResult<()> {
        let Ledger {
            initiator,
            mut members,
            dirty,
            events,
        } = ledger;
        for event in events {
            let account = match &event.owner {
                BalanceOwner::Local => Some(&mut *initiator),
                BalanceOwner::Member(id) => members.get_mut(id),
            };
            let Some(account) = account else {
                continue;
            };
            let balance = event
                .balance
                .as_ref()
                .and_then(|(tor, uuid)| account.find_balance(*tor, uuid).cloned());
            account.unit_counters.add_units(
                event.amount,
                event.tor,
                category,
                destination,
                balance.as_ref(),
            );
        }

        let empty = BTreeSet::new();
        let local_dirty = dirty.get(&BalanceOwner::Local).unwrap_or(&empty);
        self.execute_action_triggers(initiator, None, local_dirty)?;
        for (id, account) in members.iter_mut() {
            let touched = dirty
                .get(&BalanceOwner::Member(id.clone()))
                .unwrap_or(&empty);
            self.execute_action_triggers(account, None, touched)?;
        }
        for account in members.values() {
            self.stores.accounts.set_account(account)?;
            debug!("Stored shared group member {}", account.id);
        }
        Ok(())
    }
}
