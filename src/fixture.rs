//! JSON fixtures describing one charging scenario

use ocs_cache::RedisStore;
use ocs_core::models::{Account, Action, CallDescriptor, RateInterval, SharedGroup};
use ocs_core::traits::{AccountStore, SharedGroupStore};
use ocs_core::AppResult;
use ocs_engine::{DebitOptions, MemoryStore};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Accounts and reference data plus the session to charge
#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub shared_groups: Vec<SharedGroup>,
    /// Destination id to its number prefixes
    #[serde(default)]
    pub destinations: BTreeMap<String, Vec<String>>,
    /// Action set id to its actions
    #[serde(default)]
    pub actions: BTreeMap<String, Vec<Action>>,
    /// Rating subject to its pricing rule
    #[serde(default)]
    pub ratings: BTreeMap<String, RateInterval>,
    pub call: CallDescriptor,
    #[serde(default)]
    pub options: DebitOptions,
}

impl Fixture {
    pub fn from_json(json: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Ids of every account the scenario touches
    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.id.clone()).collect()
    }

    /// Seed an in-memory store with everything, ratings included
    pub fn load_memory(&self, store: &MemoryStore) {
        for account in &self.accounts {
            store.insert_account(account.clone());
        }
        for group in &self.shared_groups {
            store.insert_shared_group(group.clone());
        }
        for (id, prefixes) in &self.destinations {
            store.add_destination(id, prefixes.iter().cloned());
        }
        for (id, actions) in &self.actions {
            store.set_actions(id, actions.clone());
        }
        for (subject, rating) in &self.ratings {
            store.set_rating(subject, rating.clone());
        }
    }

    /// Seed Redis with accounts, groups, destinations and action sets.
    /// Ratings have no Redis representation and stay in memory.
    pub fn load_redis(&self, store: &RedisStore) -> AppResult<()> {
        for account in &self.accounts {
            store.set_account(account)?;
        }
        for group in &self.shared_groups {
            store.set_shared_group(group)?;
        }
        for (id, prefixes) in &self.destinations {
            store.add_destination(id, prefixes)?;
        }
        for (id, actions) in &self.actions {
            store.set_actions(id, actions)?;
        }
        debug!("Seeded Redis with {} accounts", self.accounts.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocs_core::config::EngineConfig;
    use ocs_core::models::TrafficType;
    use ocs_engine::{AccountService, Engine, Stores};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    const PREPAID_CALL: &str = include_str!("../fixtures/prepaid_call.json");

    #[test]
    fn test_prepaid_call_fixture() {
        let fixture = Fixture::from_json(PREPAID_CALL).unwrap();
        assert_eq!(fixture.account_ids(), vec!["cgrates.org:rif"]);

        let store = Arc::new(MemoryStore::new());
        fixture.load_memory(&store);
        let service = AccountService::new(Engine::new(
            Stores::in_memory(store),
            EngineConfig::default(),
        ));

        let outcome = service.debit(&fixture.call, fixture.options).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.call_cost.duration().num_seconds(), 300);

        // 10 - (5 + 0.5) crosses the low-balance trigger, which tops up 10
        let account = service.get_account("cgrates.org:rif").unwrap();
        assert_eq!(
            account.total_value(TrafficType::Monetary),
            Decimal::new(145, 1)
        );
        assert!(account.action_triggers[0].executed);
    }

    #[test]
    fn test_call_is_required() {
        assert!(Fixture::from_json(r#"{"accounts": []}"#).is_err());
    }
}
