//! Charging engine for the OCS rater
//!
//! This crate holds the algorithms that turn a priced session into balance
//! mutations, plus the rule engine that reacts to them.
//!
//! # Architecture
//!
//! - [`Engine`] owns the collaborator handles ([`Stores`]) and the engine
//!   configuration; every algorithm is a method on it
//! - [`AccountLocker`] serialises load-mutate-store cycles per account id
//! - [`AccountService`] wraps each engine operation in one locked round trip
//! - [`MemoryStore`] implements every collaborator trait in memory
//!
//! # Operations
//!
//! - `debit_credit_balance` - consume balances against a priced session
//! - `refund_increments` - credit back a previous debit
//! - `execute_action_triggers` / `reset_action_triggers` - threshold rules
//! - `apply_action` - balance and account actions
//! - `init_counters` / `clean_expired_stuff` - account housekeeping

pub mod actions;
pub mod debit;
pub mod ledger;
pub mod locker;
pub mod memory;
pub mod rating;
pub mod refund;
pub mod selection;
pub mod service;
pub mod triggers;

pub use debit::{DebitOptions, DebitOutcome};
pub use locker::{AccountGuard, AccountLocker};
pub use memory::MemoryStore;
pub use service::AccountService;

use ocs_core::config::EngineConfig;
use ocs_core::traits::{
    AccountStore, ActionStore, DestinationIndex, RatingResolver, SharedGroupStore,
};
use std::sync::Arc;

/// Collaborators the engine reads from and writes to
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub shared_groups: Arc<dyn SharedGroupStore>,
    pub destinations: Arc<dyn DestinationIndex>,
    pub actions: Arc<dyn ActionStore>,
    pub rating: Arc<dyn RatingResolver>,
}

impl Stores {
    /// Every collaborator served by one in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            shared_groups: store.clone(),
            destinations: store.clone(),
            actions: store.clone(),
            rating: store,
        }
    }
}

/// The charging engine
pub struct Engine {
    stores: Stores,
    config: EngineConfig,
}

impl Engine {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self { stores, config }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
