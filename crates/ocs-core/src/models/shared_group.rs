//! Shared groups: pools of accounts whose balances jointly absorb costs

use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::consts::META_ANY;

/// Rule picking which member's balance pays first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SharingStrategy {
    /// Originating balance first, then the others shuffled
    #[default]
    #[serde(rename = "*mine_random")]
    MineRandom,
    #[serde(rename = "*mine_lowest")]
    MineLowest,
    #[serde(rename = "*mine_highest")]
    MineHighest,
    #[serde(rename = "*random")]
    Random,
    #[serde(rename = "*lowest")]
    Lowest,
    #[serde(rename = "*highest")]
    Highest,
}

impl SharingStrategy {
    fn mine_first(&self) -> bool {
        matches!(
            self,
            SharingStrategy::MineRandom | SharingStrategy::MineLowest | SharingStrategy::MineHighest
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharingParameters {
    #[serde(default)]
    pub strategy: SharingStrategy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharedGroup {
    pub id: String,
    /// Parameters per account id, `*any` applying to the rest
    #[serde(default)]
    pub account_parameters: BTreeMap<String, SharingParameters>,
    #[serde(default)]
    pub member_ids: BTreeSet<String>,
}

impl SharedGroup {
    pub fn strategy_for(&self, account_id: &str) -> SharingStrategy {
        self.account_parameters
            .get(account_id)
            .or_else(|| self.account_parameters.get(META_ANY))
            .map(|params| params.strategy)
            .unwrap_or_default()
    }

    /// Order candidate balances for `account_id` by its sharing strategy.
    ///
    /// `value_of` reads a candidate's remaining value, `is_mine` tells the
    /// originating balance apart.
    pub fn order_by_strategy<T>(
        &self,
        account_id: &str,
        mut items: Vec<T>,
        value_of: impl Fn(&T) -> Decimal,
        is_mine: impl Fn(&T) -> bool,
    ) -> Vec<T> {
        let strategy = self.strategy_for(account_id);
        let mut mine = Vec::new();
        if strategy.mine_first() {
            let (own, others): (Vec<T>, Vec<T>) = items.into_iter().partition(|item| is_mine(item));
            mine = own;
            items = others;
        }
        match strategy {
            SharingStrategy::MineRandom | SharingStrategy::Random => {
                items.shuffle(&mut rand::thread_rng());
            }
            SharingStrategy::MineLowest | SharingStrategy::Lowest => {
                items.sort_by(|a, b| value_of(a).cmp(&value_of(b)));
            }
            SharingStrategy::MineHighest | SharingStrategy::Highest => {
                items.sort_by(|a, b| value_of(b).cmp(&value_of(a)));
            }
        }
        mine.extend(items);
        mine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn group(strategy: SharingStrategy) -> SharedGroup {
        SharedGroup {
            id: "SG_TEST".to_string(),
            account_parameters: BTreeMap::from([(
                META_ANY.to_string(),
                SharingParameters { strategy },
            )]),
            member_ids: BTreeSet::from(["rif".to_string(), "groupie".to_string()]),
        }
    }

    fn candidates() -> Vec<(&'static str, Decimal)> {
        vec![("mine", dec!(5)), ("a", dec!(30)), ("b", dec!(1)), ("c", dec!(12))]
    }

    fn order(strategy: SharingStrategy) -> Vec<&'static str> {
        group(strategy)
            .order_by_strategy("rif", candidates(), |c| c.1, |c| c.0 == "mine")
            .into_iter()
            .map(|c| c.0)
            .collect()
    }

    #[test]
    fn test_value_strategies() {
        assert_eq!(order(SharingStrategy::Lowest), vec!["b", "mine", "c", "a"]);
        assert_eq!(order(SharingStrategy::Highest), vec!["a", "c", "mine", "b"]);
        assert_eq!(order(SharingStrategy::MineLowest), vec!["mine", "b", "c", "a"]);
        assert_eq!(order(SharingStrategy::MineHighest), vec!["mine", "a", "c", "b"]);
    }

    #[test]
    fn test_mine_random_keeps_mine_first() {
        for _ in 0..20 {
            let ordered = order(SharingStrategy::MineRandom);
            assert_eq!(ordered[0], "mine");
            assert_eq!(ordered.len(), 4);
        }
    }

    #[test]
    fn test_strategy_lookup_falls_back_to_any() {
        let mut sg = group(SharingStrategy::Highest);
        sg.account_parameters.insert(
            "groupie".to_string(),
            SharingParameters {
                strategy: SharingStrategy::Lowest,
            },
        );
        assert_eq!(sg.strategy_for("groupie"), SharingStrategy::Lowest);
        assert_eq!(sg.strategy_for("rif"), SharingStrategy::Highest);
        assert_eq!(SharedGroup::default().strategy_for("rif"), SharingStrategy::MineRandom);
    }
}
