//! Per-account mutual exclusion
//!
//! At most one load-mutate-store cycle may be in flight per account id.
//! A caller locks every account it may touch in one call; the set is taken
//! all at once or not at all, so overlapping sets cannot deadlock.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Blocking, non-reentrant lock set keyed by account id
#[derive(Default)]
pub struct AccountLocker {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl AccountLocker {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every key is free, then hold them all.
    ///
    /// Locking a key already held by the calling thread blocks forever.
    pub fn lock<I, S>(&self, keys: I) -> AccountGuard<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut held = self.held();
        while keys.iter().any(|key| held.contains(key)) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.extend(keys.iter().cloned());
        debug!("Locked accounts {:?}", keys);
        AccountGuard { locker: self, keys }
    }

    /// Hold every key if all are free right now
    pub fn try_lock<I, S>(&self, keys: I) -> Option<AccountGuard<'_>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut held = self.held();
        if keys.iter().any(|key| held.contains(key)) {
            return None;
        }
        held.extend(keys.iter().cloned());
        Some(AccountGuard { locker: self, keys })
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.held().contains(key)
    }
}

/// Held account ids, released on drop
pub struct AccountGuard<'a> {
    locker: &'a AccountLocker,
    keys: BTreeSet<String>,
}

impl AccountGuard<'_> {
    pub fn covers(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locker.held();
        for key in &self.keys {
            held.remove(key);
        }
        self.locker.released.notify_all();
        debug!("Released accounts {:?}", self.keys);
    }
}
