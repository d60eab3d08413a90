//! Unit counters: cumulative usage tracked per traffic type

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::balance::Balance;
use super::balance_filter::BalanceFilter;
use super::destination::ResolvedDestination;
use super::traffic::TrafficType;

/// What a counter matches its filters against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CounterType {
    /// The call itself (category and destination)
    #[default]
    #[serde(rename = "*event")]
    Event,
    /// The balance that paid
    #[serde(rename = "*balance")]
    Balance,
}

/// Running value of one filter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CounterFilter {
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub filter: BalanceFilter,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitCounter {
    #[serde(default)]
    pub counter_type: CounterType,
    #[serde(default)]
    pub counters: Vec<CounterFilter>,
}

/// Counters keyed by the traffic type they count
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCounters(pub BTreeMap<TrafficType, Vec<UnitCounter>>);

impl Deref for UnitCounters {
    type Target = BTreeMap<TrafficType, Vec<UnitCounter>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UnitCounters {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl UnitCounters {
    /// Add `amount` to every filter under `tor` matching the call (event
    /// counters) or the paying `balance` (balance counters).
    pub fn add_units(
        &mut self,
        amount: Decimal,
        tor: TrafficType,
        category: &str,
        destination: &ResolvedDestination,
        balance: Option<&Balance>,
    ) {
        let Some(counters) = self.0.get_mut(&tor) else {
            return;
        };
        for counter in counters.iter_mut() {
            for cf in counter.counters.iter_mut() {
                let matched = match counter.counter_type {
                    CounterType::Event => cf.filter.matches_call_cost(category, destination),
                    CounterType::Balance => {
                        balance.is_some_and(|b| b.match_filter(&cf.filter, false, false))
                    }
                };
                if matched {
                    cf.value += amount;
                }
            }
        }
    }

    /// Zero the filters selected by `filter`, or every filter when `None`.
    ///
    /// A filter naming a balance type leaves other types untouched.
    pub fn reset_counters(&mut self, filter: Option<&BalanceFilter>) {
        for (tor, counters) in self.0.iter_mut() {
            if let Some(balance_type) = filter.and_then(|f| f.balance_type) {
                if balance_type != *tor {
                    continue;
                }
            }
            for cf in counters.iter_mut().flat_map(|c| c.counters.iter_mut()) {
                let selected = filter.map_or(true, |f| f.selects_all() || cf.filter.same_selection(f));
                if selected {
                    cf.value = Decimal::ZERO;
                }
            }
        }
    }

    /// Value of the filter equal to `filter` under `(tor, counter_type)`
    pub fn value_of(
        &self,
        tor: TrafficType,
        counter_type: CounterType,
        filter: &BalanceFilter,
    ) -> Option<Decimal> {
        self.0
            .get(&tor)?
            .iter()
            .filter(|c| c.counter_type == counter_type)
            .flat_map(|c| c.counters.iter())
            .find(|cf| cf.filter.same_selection(filter))
            .map(|cf| cf.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn counters() -> UnitCounters {
        let nat = BalanceFilter {
            destination_ids: Some(set(&["NAT"])),
            ..BalanceFilter::default()
        };
        let weighted = BalanceFilter {
            weight: Some(dec!(20)),
            ..BalanceFilter::default()
        };
        UnitCounters(BTreeMap::from([
            (
                TrafficType::Voice,
                vec![
                    UnitCounter {
                        counter_type: CounterType::Event,
                        counters: vec![CounterFilter { value: dec!(0), filter: nat }],
                    },
                    UnitCounter {
                        counter_type: CounterType::Balance,
                        counters: vec![CounterFilter { value: dec!(0), filter: weighted }],
                    },
                ],
            ),
            (
                TrafficType::Monetary,
                vec![UnitCounter {
                    counter_type: CounterType::Event,
                    counters: vec![CounterFilter::default()],
                }],
            ),
        ]))
    }

    fn nat_destination() -> ResolvedDestination {
        ResolvedDestination {
            number: "0723".to_string(),
            matches: vec![(4, vec!["NAT".to_string()])],
        }
    }

    #[test]
    fn test_add_units_by_counter_type() {
        let mut ucs = counters();
        let heavy = Balance {
            weight: dec!(20),
            ..Balance::default()
        };
        ucs.add_units(dec!(10), TrafficType::Voice, "call", &nat_destination(), Some(&heavy));
        ucs.add_units(dec!(5), TrafficType::Voice, "call", &ResolvedDestination::default(), None);
        let voice = &ucs[&TrafficType::Voice];
        assert_eq!(voice[0].counters[0].value, dec!(10));
        assert_eq!(voice[1].counters[0].value, dec!(10));
        assert_eq!(ucs[&TrafficType::Monetary][0].counters[0].value, dec!(0));
    }

    #[test]
    fn test_reset_leaves_other_types() {
        let mut ucs = counters();
        ucs.add_units(dec!(3), TrafficType::Voice, "call", &nat_destination(), None);
        ucs.add_units(dec!(7), TrafficType::Monetary, "call", &nat_destination(), None);
        ucs.reset_counters(Some(&BalanceFilter {
            balance_type: Some(TrafficType::Voice),
            ..BalanceFilter::default()
        }));
        assert_eq!(ucs[&TrafficType::Voice][0].counters[0].value, dec!(0));
        assert_eq!(ucs[&TrafficType::Monetary][0].counters[0].value, dec!(7));
        ucs.reset_counters(None);
        assert_eq!(ucs[&TrafficType::Monetary][0].counters[0].value, dec!(0));
    }

    #[test]
    fn test_reset_only_selected_filter() {
        let mut ucs = counters();
        let heavy = Balance {
            weight: dec!(20),
            ..Balance::default()
        };
        ucs.add_units(dec!(4), TrafficType::Voice, "call", &nat_destination(), Some(&heavy));
        ucs.reset_counters(Some(&BalanceFilter {
            balance_type: Some(TrafficType::Voice),
            weight: Some(dec!(20)),
            ..BalanceFilter::default()
        }));
        let voice = &ucs[&TrafficType::Voice];
        assert_eq!(voice[0].counters[0].value, dec!(4));
        assert_eq!(voice[1].counters[0].value, dec!(0));
        assert_eq!(
            ucs.value_of(
                TrafficType::Voice,
                CounterType::Event,
                &BalanceFilter {
                    destination_ids: Some(set(&["NAT"])),
                    ..BalanceFilter::default()
                }
            ),
            Some(dec!(4))
        );
    }
}
