//! Partial balance description used by actions, triggers and counters

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::balance::Balance;
use super::destination::ResolvedDestination;
use super::traffic::TrafficType;
use crate::consts::META_ANY;

/// Balance description where every unset field is a wildcard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Traffic type of the balance collection the filter targets
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub balance_type: Option<TrafficType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ids: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_groups: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_ids: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<BTreeMap<TrafficType, Decimal>>,
}

impl BalanceFilter {
    pub fn balance_type(&self) -> TrafficType {
        self.balance_type.unwrap_or_default()
    }

    pub fn value(&self) -> Decimal {
        self.value.unwrap_or_default()
    }

    /// Same selection, ignoring value and balance type. Two set ids decide alone.
    pub fn same_selection(&self, other: &BalanceFilter) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            return a == b;
        }
        let strip = |f: &BalanceFilter| BalanceFilter {
            value: None,
            balance_type: None,
            ..f.clone()
        };
        strip(self) == strip(other)
    }

    /// Selects every balance of its type
    pub fn selects_all(&self) -> bool {
        self.same_selection(&BalanceFilter::default())
    }

    /// New balance carrying every set field; a fresh uuid when none is set
    pub fn create_balance(&self) -> Balance {
        let uuid = self
            .uuid
            .clone()
            .filter(|uuid| !uuid.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Balance {
            uuid,
            id: self.id.clone().unwrap_or_default(),
            value: self.value(),
            expiration_date: self.expiration_date,
            weight: self.weight.unwrap_or_default(),
            destination_ids: self.destination_ids.clone().unwrap_or_default(),
            rating_subject: self.rating_subject.clone().unwrap_or_default(),
            categories: self.categories.clone().unwrap_or_default(),
            shared_groups: self.shared_groups.clone().unwrap_or_default(),
            timing_ids: self.timing_ids.clone().unwrap_or_default(),
            disabled: self.disabled.unwrap_or_default(),
            blocker: self.blocker.unwrap_or_default(),
            factor: self.factor.clone().unwrap_or_default(),
        }
    }

    /// Filter selecting the non-empty fields of `b`
    pub fn load_from_balance(b: &Balance) -> Self {
        fn non_empty(set: &BTreeSet<String>) -> Option<BTreeSet<String>> {
            (!set.is_empty()).then(|| set.clone())
        }
        Self {
            uuid: (!b.uuid.is_empty()).then(|| b.uuid.clone()),
            id: (!b.id.is_empty()).then(|| b.id.clone()),
            balance_type: None,
            value: (!b.value.is_zero()).then_some(b.value),
            expiration_date: b.expiration_date,
            weight: (!b.weight.is_zero()).then_some(b.weight),
            destination_ids: non_empty(&b.destination_ids),
            rating_subject: (!b.rating_subject.is_empty()).then(|| b.rating_subject.clone()),
            categories: non_empty(&b.categories),
            shared_groups: non_empty(&b.shared_groups),
            timing_ids: non_empty(&b.timing_ids),
            disabled: b.disabled.then_some(true),
            blocker: b.blocker.then_some(true),
            factor: (!b.factor.is_empty()).then(|| b.factor.clone()),
        }
    }

    /// Overwrite the fields of `b` this filter sets, except its uuid
    pub fn modify_balance(&self, b: &mut Balance) {
        if let Some(id) = &self.id {
            b.id = id.clone();
        }
        if let Some(value) = self.value {
            b.value = value;
        }
        if let Some(expiration) = self.expiration_date {
            b.expiration_date = Some(expiration);
        }
        if let Some(weight) = self.weight {
            b.weight = weight;
        }
        if let Some(ids) = &self.destination_ids {
            b.destination_ids = ids.clone();
        }
        if let Some(subject) = &self.rating_subject {
            b.rating_subject = subject.clone();
        }
        if let Some(categories) = &self.categories {
            b.categories = categories.clone();
        }
        if let Some(groups) = &self.shared_groups {
            b.shared_groups = groups.clone();
        }
        if let Some(ids) = &self.timing_ids {
            b.timing_ids = ids.clone();
        }
        if let Some(disabled) = self.disabled {
            b.disabled = disabled;
        }
        if let Some(blocker) = self.blocker {
            b.blocker = blocker;
        }
        if let Some(factor) = &self.factor {
            b.factor = factor.clone();
        }
    }

    /// Whether a call with `category` to `destination` falls under this filter
    pub fn matches_call_cost(&self, category: &str, destination: &ResolvedDestination) -> bool {
        let category_ok = self
            .categories
            .as_ref()
            .map_or(true, |cats| cats.is_empty() || cats.contains(category));
        let destination_ok = self.destination_ids.as_ref().map_or(true, |ids| {
            if ids.is_empty() || ids.contains(META_ANY) {
                return true;
            }
            let resolved = destination.all_ids();
            ids.iter().any(|id| resolved.contains(id.as_str()))
        });
        category_ok && destination_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_balance_generates_uuid() {
        let filter = BalanceFilter {
            id: Some("minutes".to_string()),
            value: Some(dec!(60)),
            weight: Some(dec!(10)),
            ..BalanceFilter::default()
        };
        let a = filter.create_balance();
        let b = filter.create_balance();
        assert_eq!(a.id, "minutes");
        assert_eq!(a.value, dec!(60));
        assert!(!a.uuid.is_empty());
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_load_from_balance_matches_source() {
        let b = Balance {
            uuid: "b1".to_string(),
            weight: dec!(20),
            destination_ids: set(&["NAT"]),
            blocker: true,
            ..Balance::default()
        };
        let filter = BalanceFilter::load_from_balance(&b);
        assert_eq!(filter.uuid.as_deref(), Some("b1"));
        assert_eq!(filter.id, None);
        assert_eq!(filter.blocker, Some(true));
        assert_eq!(filter.disabled, None);
        assert!(b.hard_match_filter(&filter, true));
    }

    #[test]
    fn test_modify_balance_keeps_uuid() {
        let mut b = Balance {
            uuid: "b1".to_string(),
            value: dec!(5),
            ..Balance::default()
        };
        let filter = BalanceFilter {
            uuid: Some("other".to_string()),
            value: Some(dec!(9)),
            disabled: Some(true),
            ..BalanceFilter::default()
        };
        filter.modify_balance(&mut b);
        assert_eq!(b.uuid, "b1");
        assert_eq!(b.value, dec!(9));
        assert!(b.disabled);
    }

    #[test]
    fn test_matches_call_cost() {
        let destination = ResolvedDestination {
            number: "49176".to_string(),
            matches: vec![(3, vec!["GERMANY_MOBILE".to_string()]), (2, vec!["GERMANY".to_string()])],
        };
        let filter = BalanceFilter {
            destination_ids: Some(set(&["GERMANY"])),
            categories: Some(set(&["call"])),
            ..BalanceFilter::default()
        };
        assert!(filter.matches_call_cost("call", &destination));
        assert!(!filter.matches_call_cost("sms", &destination));
        let other = BalanceFilter {
            destination_ids: Some(set(&["FRANCE"])),
            ..BalanceFilter::default()
        };
        assert!(!other.matches_call_cost("call", &destination));
        assert!(BalanceFilter::default().matches_call_cost("anything", &destination));
    }
}
