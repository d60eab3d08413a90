//! Account model
//!
//! An account owns balances grouped by traffic type, its usage counters and
//! its action triggers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::action_trigger::ActionTriggers;
use super::balance::{Balance, Balances};
use super::traffic::TrafficType;
use super::unit_counter::UnitCounters;
use crate::consts::{DEFAULT_BALANCE_WEIGHT, META_DEFAULT};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    /// Tenant-qualified id, e.g. `cgrates.org:rif`
    pub id: String,
    pub balance_map: BTreeMap<TrafficType, Balances>,
    pub unit_counters: UnitCounters,
    pub action_triggers: ActionTriggers,
    pub allow_negative: bool,
    pub disabled: bool,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn balances(&self, tor: TrafficType) -> &[Balance] {
        self.balance_map
            .get(&tor)
            .map(|balances| balances.as_slice())
            .unwrap_or(&[])
    }

    pub fn balances_mut(&mut self, tor: TrafficType) -> &mut Balances {
        self.balance_map.entry(tor).or_default()
    }

    /// The `*default` money balance, created on first use
    pub fn default_money_balance(&mut self) -> &mut Balance {
        let balances = self.balance_map.entry(TrafficType::Monetary).or_default();
        let index = match balances.iter().position(Balance::is_default) {
            Some(index) => index,
            None => {
                balances.push(Balance {
                    uuid: Uuid::new_v4().to_string(),
                    id: META_DEFAULT.to_string(),
                    weight: Decimal::from(DEFAULT_BALANCE_WEIGHT),
                    ..Balance::default()
                });
                balances.len() - 1
            }
        };
        &mut balances[index]
    }

    pub fn find_balance(&self, tor: TrafficType, uuid: &str) -> Option<&Balance> {
        self.balance_map.get(&tor)?.get(uuid)
    }

    pub fn find_balance_mut(&mut self, tor: TrafficType, uuid: &str) -> Option<&mut Balance> {
        self.balance_map.get_mut(&tor)?.get_mut(uuid)
    }

    /// Keep `existing`'s balances when this write would drop all of them
    pub fn guard_overwrite(&mut self, existing: &Account) {
        let empty = self.balance_map.values().all(|balances| balances.is_empty());
        let populated = existing.balance_map.values().any(|balances| !balances.is_empty());
        if empty && populated {
            self.balance_map = existing.balance_map.clone();
        }
    }

    /// Remove balances expired at `now`, returning them
    pub fn clean_expired_balances(&mut self, now: DateTime<Utc>) -> Vec<Balance> {
        let mut removed = Vec::new();
        for balances in self.balance_map.values_mut() {
            let (expired, kept): (Vec<Balance>, Vec<Balance>) =
                balances.drain(..).partition(|b| b.is_expired_at(now));
            balances.0 = kept;
            removed.extend(expired);
        }
        removed
    }

    /// Ids of every shared group some balance is pooled in
    pub fn shared_groups(&self) -> BTreeSet<String> {
        self.balance_map
            .values()
            .flat_map(|balances| balances.iter())
            .flat_map(|b| b.shared_groups.iter().cloned())
            .collect()
    }

    pub fn total_value(&self, tor: TrafficType) -> Decimal {
        self.balance_map
            .get(&tor)
            .map(Balances::total_value)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn money(uuid: &str, value: Decimal) -> Balance {
        Balance {
            uuid: uuid.to_string(),
            value,
            ..Balance::default()
        }
    }

    #[test]
    fn test_default_balance_created_once() {
        let mut acc = Account::new("cgrates.org:rif");
        let uuid = acc.default_money_balance().uuid.clone();
        acc.default_money_balance().subtract_value(dec!(1));
        assert_eq!(acc.balances(TrafficType::Monetary).len(), 1);
        let b = acc.find_balance(TrafficType::Monetary, &uuid).unwrap();
        assert!(b.is_default());
        assert_eq!(b.weight, dec!(999));
        assert_eq!(b.value, dec!(-1));
    }

    #[test]
    fn test_guard_overwrite() {
        let mut existing = Account::new("cgrates.org:rif");
        existing
            .balances_mut(TrafficType::Monetary)
            .push(money("m1", dec!(10)));
        let mut blank = Account::new("cgrates.org:rif");
        blank.allow_negative = true;
        blank.guard_overwrite(&existing);
        assert_eq!(blank.total_value(TrafficType::Monetary), dec!(10));
        assert!(blank.allow_negative);

        let mut changed = existing.clone();
        changed.balances_mut(TrafficType::Monetary)[0].value = dec!(3);
        changed.guard_overwrite(&existing);
        assert_eq!(changed.total_value(TrafficType::Monetary), dec!(3));
    }

    #[test]
    fn test_clean_expired_balances() {
        let now = Utc.with_ymd_and_hms(2013, 9, 24, 10, 48, 0).unwrap();
        let mut acc = Account::new("cgrates.org:rif");
        let mut old = money("old", dec!(5));
        old.expiration_date = Some(now - Duration::hours(1));
        acc.balances_mut(TrafficType::Voice).push(old);
        acc.balances_mut(TrafficType::Voice).push(money("fresh", dec!(5)));
        let removed = acc.clean_expired_balances(now);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].uuid, "old");
        assert_eq!(acc.balances(TrafficType::Voice).len(), 1);
    }

    #[test]
    fn test_shared_groups() {
        let mut acc = Account::new("cgrates.org:rif");
        let mut b = money("m1", dec!(0));
        b.shared_groups = BTreeSet::from(["SG_TEST".to_string()]);
        acc.balances_mut(TrafficType::Monetary).push(b);
        assert_eq!(
            acc.shared_groups().into_iter().collect::<Vec<_>>(),
            vec!["SG_TEST".to_string()]
        );
    }
}
