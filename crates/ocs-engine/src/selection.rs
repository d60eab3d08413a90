//! Balance selection
//!
//! Picks the balances eligible to pay for a session and orders them:
//! local matches by `(precision desc, weight desc)`, shared balances
//! expanded in place following their group's sharing strategy.

use chrono::{DateTime, Utc};
use ocs_core::models::{
    Account, Balance, RatingSubject, ResolvedDestination, TrafficType,
};
use ocs_core::{AppError, AppResult};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ledger::{BalanceOwner, Ledger};
use crate::locker::AccountGuard;
use crate::Engine;

/// A balance eligible for one debit pass
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCandidate {
    pub owner: BalanceOwner,
    /// Collection the balance lives in
    pub tor: TrafficType,
    pub uuid: String,
    /// Length of the destination prefix the balance matched on
    pub precision: usize,
    pub weight: Decimal,
    pub blocker: bool,
    pub subject: RatingSubject,
}

impl BalanceCandidate {
    fn new(owner: BalanceOwner, tor: TrafficType, balance: &Balance, precision: usize) -> Self {
        Self {
            owner,
            tor,
            uuid: balance.uuid.clone(),
            precision,
            weight: balance.weight,
            blocker: balance.blocker,
            subject: balance.subject(),
        }
    }
}

/// Balances of `account` eligible for `tor`, sorted by precision then weight.
///
/// With `shared_group` set only balances pooled in that group qualify.
pub fn matching_balances<'a>(
    account: &'a Account,
    tor: TrafficType,
    category: &str,
    destination: &ResolvedDestination,
    shared_group: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<(TrafficType, &'a Balance, usize)> {
    let mut collections = vec![tor];
    if tor.falls_back_to_generic() {
        collections.push(TrafficType::Generic);
    }
    let mut matched = Vec::new();
    for collection in collections {
        for b in account.balances(collection) {
            if b.disabled || b.is_expired_at(now) {
                continue;
            }
            if b.shared_groups.is_empty() && !b.blocker && b.value <= Decimal::ZERO {
                continue;
            }
            if shared_group.is_some_and(|group| !b.shared_groups.contains(group)) {
                continue;
            }
            if !b.match_category(category) {
                continue;
            }
            if let Some(precision) = destination.precision_for(&b.destination_ids) {
                matched.push((collection, b, precision));
            }
        }
    }
    matched.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| b.1.weight.cmp(&a.1.weight)));
    matched
}

impl Engine {
    /// Ordered payment candidates for `tor`, shared groups expanded.
    ///
    /// Members of the groups involved are loaded into `ledger`; each must be
    /// covered by `guard`.
    pub fn select_candidates(
        &self,
        ledger: &mut Ledger<'_>,
        tor: TrafficType,
        category: &str,
        destination: &ResolvedDestination,
        guard: &AccountGuard<'_>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BalanceCandidate>> {
        let local: Vec<BalanceCandidate> =
            matching_balances(ledger.initiator(), tor, category, destination, None, now)
                .into_iter()
                .map(|(collection, b, precision)| {
                    BalanceCandidate::new(BalanceOwner::Local, collection, b, precision)
                })
                .collect();
        let mut groups_of = Vec::with_capacity(local.len());
        for candidate in &local {
            let groups = ledger
                .balance(&BalanceOwner::Local, candidate.tor, &candidate.uuid)
                .map(|b| b.shared_groups.clone())
                .unwrap_or_default();
            groups_of.push(groups);
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (candidate, groups) in local.into_iter().zip(groups_of) {
            if groups.is_empty() {
                if seen.insert((candidate.owner.clone(), candidate.tor, candidate.uuid.clone())) {
                    candidates.push(candidate);
                }
                continue;
            }
            for group_id in &groups {
                let shared = self.shared_candidates(
                    ledger, group_id, &candidate, tor, category, destination, guard, now,
                )?;
                for shared_candidate in shared {
                    let key = (
                        shared_candidate.owner.clone(),
                        shared_candidate.tor,
                        shared_candidate.uuid.clone(),
                    );
                    if seen.insert(key) {
                        candidates.push(shared_candidate);
                    }
                }
            }
        }
        debug!(
            "Selected {} {} balance candidates for account {}",
            candidates.len(),
            tor,
            ledger.initiator().id
        );
        Ok(candidates)
    }

    /// Balances of every member of `group_id`, ordered by its strategy
    #[allow(clippy::too_many_arguments)]
    fn shared_candidates(
        &self,
        ledger: &mut Ledger<'_>,
        group_id: &str,
        origin: &BalanceCandidate,
        tor: TrafficType,
        category: &str,
        destination: &ResolvedDestination,
        guard: &AccountGuard<'_>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BalanceCandidate>> {
        let group = match self.stores.shared_groups.get_shared_group(group_id) {
            Ok(group) => group,
            Err(AppError::SharedGroupNotFound(_)) => {
                warn!("Could not get shared group: {}", group_id);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let mut items: Vec<(BalanceCandidate, Decimal)> = Vec::new();
        let initiator_id = ledger.initiator().id.clone();
        if !group.member_ids.contains(&initiator_id) {
            if let Some(b) = ledger.balance(&origin.owner, origin.tor, &origin.uuid) {
                items.push((origin.clone(), b.value));
            }
        }
        for member_id in &group.member_ids {
            let owner = ledger.load_member(member_id, &self.stores, guard)?;
            let Some(account) = ledger.account(&owner) else {
                continue;
            };
            for (collection, b, precision) in
                matching_balances(account, tor, category, destination, Some(group_id), now)
            {
                items.push((
                    BalanceCandidate::new(owner.clone(), collection, b, precision),
                    b.value,
                ));
            }
        }
        let ordered = group.order_by_strategy(
            &initiator_id,
            items,
            |(_, value)| *value,
            |(candidate, _)| candidate.owner == origin.owner && candidate.uuid == origin.uuid,
        );
        Ok(ordered.into_iter().map(|(candidate, _)| candidate).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn balance(uuid: &str, value: Decimal, weight: Decimal) -> Balance {
        Balance {
            uuid: uuid.to_string(),
            value,
            weight,
            ..Balance::default()
        }
    }

    fn national() -> ResolvedDestination {
        ResolvedDestination {
            number: "0723045326".to_string(),
            matches: vec![(4, vec!["RET".to_string()]), (2, vec!["NAT".to_string()])],
        }
    }

    fn uuids(matched: &[(TrafficType, &Balance, usize)]) -> Vec<String> {
        matched.iter().map(|(_, b, _)| b.uuid.clone()).collect()
    }

    #[test]
    fn test_precision_beats_weight() {
        let mut acc = Account::new("cgrates.org:rif");
        let mut nat = balance("nat", dec!(10), dec!(20));
        nat.destination_ids = set(&["NAT"]);
        let mut ret = balance("ret", dec!(10), dec!(10));
        ret.destination_ids = set(&["RET"]);
        let any = balance("any", dec!(10), dec!(30));
        acc.balances_mut(TrafficType::Voice).0 = vec![nat, any, ret];
        let matched = matching_balances(
            &acc,
            TrafficType::Voice,
            "call",
            &national(),
            None,
            Utc::now(),
        );
        assert_eq!(uuids(&matched), vec!["ret", "nat", "any"]);
        assert_eq!(matched[0].2, 4);
    }

    #[test]
    fn test_exclusions() {
        let now = Utc::now();
        let mut acc = Account::new("cgrates.org:rif");
        let mut disabled = balance("disabled", dec!(10), dec!(0));
        disabled.disabled = true;
        let mut expired = balance("expired", dec!(10), dec!(0));
        expired.expiration_date = Some(now - Duration::seconds(1));
        let empty = balance("empty", dec!(0), dec!(0));
        let mut empty_blocker = balance("empty_blocker", dec!(0), dec!(0));
        empty_blocker.blocker = true;
        let mut empty_shared = balance("empty_shared", dec!(0), dec!(0));
        empty_shared.shared_groups = set(&["SG"]);
        let mut sms_only = balance("sms_only", dec!(5), dec!(0));
        sms_only.categories = set(&["sms"]);
        let mut elsewhere = balance("elsewhere", dec!(5), dec!(0));
        elsewhere.destination_ids = set(&["FRANCE"]);
        acc.balances_mut(TrafficType::Monetary).0 = vec![
            disabled,
            expired,
            empty,
            empty_blocker,
            empty_shared,
            sms_only,
            elsewhere,
        ];
        let matched =
            matching_balances(&acc, TrafficType::Monetary, "call", &national(), None, now);
        assert_eq!(uuids(&matched), vec!["empty_blocker", "empty_shared"]);
    }

    #[test]
    fn test_unit_types_fall_back_to_generic() {
        let mut acc = Account::new("cgrates.org:rif");
        acc.balances_mut(TrafficType::Voice)
            .push(balance("voice", dec!(10), dec!(10)));
        acc.balances_mut(TrafficType::Generic)
            .push(balance("generic", dec!(10), dec!(20)));
        let voice = matching_balances(
            &acc,
            TrafficType::Voice,
            "call",
            &national(),
            None,
            Utc::now(),
        );
        assert_eq!(uuids(&voice), vec!["generic", "voice"]);
        assert_eq!(voice[0].0, TrafficType::Generic);
        let money = matching_balances(
            &acc,
            TrafficType::Monetary,
            "call",
            &national(),
            None,
            Utc::now(),
        );
        assert!(money.is_empty());
    }

    proptest! {
        #[test]
        fn sort_is_idempotent_and_stable(weights in prop::collection::vec(0i64..4, 0..20)) {
            let mut acc = Account::new("cgrates.org:rif");
            for (i, w) in weights.iter().enumerate() {
                acc.balances_mut(TrafficType::Monetary)
                    .push(balance(&format!("b{:02}", i), dec!(1), Decimal::from(*w)));
            }
            let now = Utc::now();
            let first = uuids(&matching_balances(&acc, TrafficType::Monetary, "", &national(), None, now));
            prop_assert_eq!(first.len(), weights.len());
            for pair in first.windows(2) {
                let a = acc.find_balance(TrafficType::Monetary, &pair[0]).unwrap();
                let b = acc.find_balance(TrafficType::Monetary, &pair[1]).unwrap();
                prop_assert!(a.weight >= b.weight);
                if a.weight == b.weight {
                    prop_assert!(pair[0] < pair[1]);
                }
            }

            acc.balances_mut(TrafficType::Monetary).sort();
            let second = uuids(&matching_balances(&acc, TrafficType::Monetary, "", &national(), None, now));
            prop_assert_eq!(first, second);
        }
    }
}
