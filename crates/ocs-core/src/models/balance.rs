//! Balance model
//!
//! A balance is a bucket of consumable value (money or traffic units)
//! owned by one account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

use super::balance_filter::BalanceFilter;
use super::traffic::{RatingSubject, TrafficType};
use crate::consts::{META_ANY, META_DEFAULT};

/// Bucket of consumable value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Balance {
    /// System-unique identifier
    pub uuid: String,
    /// Account-scoped identifier
    pub id: String,
    /// Remaining value, money or traffic units
    pub value: Decimal,
    /// Instant after which the balance is no longer usable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Selection priority, higher is tried first
    pub weight: Decimal,
    /// Destinations the balance applies to; empty or `*any` means all
    pub destination_ids: BTreeSet<String>,
    /// Rating override (`*zero1s`, `*zero1m`, or another subject)
    pub rating_subject: String,
    /// Call categories the balance applies to; empty means all
    pub categories: BTreeSet<String>,
    /// Shared groups this balance is pooled in
    pub shared_groups: BTreeSet<String>,
    /// Timing profiles restricting usage
    pub timing_ids: BTreeSet<String>,
    pub disabled: bool,
    /// Prevents fallback to other balances when it cannot pay
    pub blocker: bool,
    /// Per traffic type value conversion, 1 when absent
    pub factor: BTreeMap<TrafficType, Decimal>,
}

fn includes(have: &BTreeSet<String>, want: &BTreeSet<String>) -> bool {
    want.iter().all(|item| have.contains(item))
}

impl Balance {
    pub fn is_default(&self) -> bool {
        self.id == META_DEFAULT
    }

    /// Expired iff an expiration is set and lies before `t`
    pub fn is_expired_at(&self, t: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiry| expiry < t)
    }

    /// Destination-scoped, as opposed to any-destination
    pub fn has_destination(&self) -> bool {
        !self.destination_ids.is_empty() && !self.destination_ids.contains(META_ANY)
    }

    pub fn match_category(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.contains(category)
    }

    pub fn factor_for(&self, tor: TrafficType) -> Decimal {
        self.factor.get(&tor).copied().unwrap_or(Decimal::ONE)
    }

    pub fn subject(&self) -> RatingSubject {
        RatingSubject::parse(&self.rating_subject)
    }

    pub fn add_value(&mut self, amount: Decimal) {
        self.value += amount;
    }

    pub fn subtract_value(&mut self, amount: Decimal) {
        self.value -= amount;
    }

    /// Every set field of `filter` is satisfied; unset fields match anything.
    ///
    /// A set uuid or id decides alone unless `skip_ids`.
    pub fn match_filter(&self, filter: &BalanceFilter, skip_ids: bool, skip_expiry: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid.as_deref().filter(|uuid| !uuid.is_empty()) {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
                return self.id == id;
            }
        }
        if !skip_expiry && filter.expiration_date.is_some() && filter.expiration_date != self.expiration_date {
            return false;
        }
        filter.weight.map_or(true, |w| self.weight == w)
            && filter.blocker.map_or(true, |b| self.blocker == b)
            && filter.disabled.map_or(true, |d| self.disabled == d)
            && filter
                .destination_ids
                .as_ref()
                .map_or(true, |ids| includes(&self.destination_ids, ids))
            && filter
                .categories
                .as_ref()
                .map_or(true, |cats| includes(&self.categories, cats))
            && filter
                .timing_ids
                .as_ref()
                .map_or(true, |ids| includes(&self.timing_ids, ids))
            && filter
                .shared_groups
                .as_ref()
                .map_or(true, |groups| includes(&self.shared_groups, groups))
            && filter
                .rating_subject
                .as_ref()
                .map_or(true, |subject| &self.rating_subject == subject)
    }

    /// Like [`Balance::match_filter`] but set fields must be equal, not included
    pub fn hard_match_filter(&self, filter: &BalanceFilter, skip_ids: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid.as_deref().filter(|uuid| !uuid.is_empty()) {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
                return self.id == id;
            }
        }
        if filter.expiration_date.is_some() && filter.expiration_date != self.expiration_date {
            return false;
        }
        filter.weight.map_or(true, |w| self.weight == w)
            && filter.blocker.map_or(true, |b| self.blocker == b)
            && filter.disabled.map_or(true, |d| self.disabled == d)
            && filter
                .destination_ids
                .as_ref()
                .map_or(true, |ids| &self.destination_ids == ids)
            && filter
                .categories
                .as_ref()
                .map_or(true, |cats| &self.categories == cats)
            && filter
                .timing_ids
                .as_ref()
                .map_or(true, |ids| &self.timing_ids == ids)
            && filter
                .shared_groups
                .as_ref()
                .map_or(true, |groups| &self.shared_groups == groups)
            && filter
                .rating_subject
                .as_ref()
                .map_or(true, |subject| &self.rating_subject == subject)
    }
}

/// Balances of one traffic type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(pub Vec<Balance>);

impl Deref for Balances {
    type Target = Vec<Balance>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Balances {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Balance>> for Balances {
    fn from(balances: Vec<Balance>) -> Self {
        Self(balances)
    }
}

impl Balances {
    /// Stable sort, heaviest first
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| b.weight.cmp(&a.weight));
    }

    pub fn total_value(&self) -> Decimal {
        self.0.iter().map(|b| b.value).sum()
    }

    pub fn get(&self, uuid: &str) -> Option<&Balance> {
        self.0.iter().find(|b| b.uuid == uuid)
    }

    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut Balance> {
        self.0.iter_mut().find(|b| b.uuid == uuid)
    }
}
