//! In-memory collaborators
//!
//! One store implementing every collaborator trait on `RwLock` maps.
//! Used by the tests and the fixture runner.

use ocs_core::models::{Account, Action, RateInterval, SharedGroup};
use ocs_core::traits::{
    AccountStore, ActionStore, DestinationIndex, RatingRequest, RatingResolver, SharedGroupStore,
};
use ocs_core::{AppError, AppResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

// Poisoning is ignored: no write leaves a map half-updated.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    shared_groups: RwLock<HashMap<String, SharedGroup>>,
    /// Prefix to destination ids
    destinations: RwLock<HashMap<String, BTreeSet<String>>>,
    actions: RwLock<HashMap<String, Vec<Action>>>,
    /// Rating subject to its pricing rule
    ratings: RwLock<HashMap<String, RateInterval>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: Account) {
        write(&self.accounts).insert(account.id.clone(), account);
    }

    pub fn insert_shared_group(&self, group: SharedGroup) {
        write(&self.shared_groups).insert(group.id.clone(), group);
    }

    /// Register destination `id` under each of `prefixes`
    pub fn add_destination<I, S>(&self, id: &str, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut destinations = write(&self.destinations);
        for prefix in prefixes {
            destinations
                .entry(prefix.into())
                .or_default()
                .insert(id.to_string());
        }
    }

    pub fn set_actions(&self, id: &str, actions: Vec<Action>) {
        write(&self.actions).insert(id.to_string(), actions);
    }

    pub fn set_rating(&self, subject: &str, rating: RateInterval) {
        write(&self.ratings).insert(subject.to_string(), rating);
    }

    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = read(&self.accounts).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl AccountStore for MemoryStore {
    fn get_account(&self, id: &str) -> AppResult<Account> {
        read(&self.accounts)
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    fn set_account(&self, account: &Account) -> AppResult<()> {
        let mut accounts = write(&self.accounts);
        let mut stored = account.clone();
        if let Some(existing) = accounts.get(&account.id) {
            stored.guard_overwrite(existing);
        }
        debug!("Stored account {}", stored.id);
        accounts.insert(stored.id.clone(), stored);
        Ok(())
    }
}

impl SharedGroupStore for MemoryStore {
    fn get_shared_group(&self, id: &str) -> AppResult<SharedGroup> {
        read(&self.shared_groups)
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SharedGroupNotFound(id.to_string()))
    }

    fn set_shared_group(&self, group: &SharedGroup) -> AppResult<()> {
        write(&self.shared_groups)
            .insert(group.id.clone(), group.clone());
        Ok(())
    }
}

impl DestinationIndex for MemoryStore {
    fn destination_ids(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(read(&self.destinations)
            .get(prefix)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl ActionStore for MemoryStore {
    fn get_actions(&self, id: &str) -> AppResult<Vec<Action>> {
        read(&self.actions)
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::ActionsNotFound(id.to_string()))
    }
}

impl RatingResolver for MemoryStore {
    fn resolve(&self, request: &RatingRequest) -> AppResult<Option<RateInterval>> {
        Ok(read(&self.ratings).get(&request.subject).cloned())
    }
}
