//! Threshold rules firing action sets

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use super::action::Action;
use super::balance_filter::BalanceFilter;
use super::traffic::TrafficType;
use super::unit_counter::CounterType;
use crate::utils::duration_nanos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdType {
    #[serde(rename = "*min_event_counter")]
    MinEventCounter,
    #[serde(rename = "*max_event_counter")]
    MaxEventCounter,
    #[serde(rename = "*min_balance_counter")]
    MinBalanceCounter,
    #[serde(rename = "*max_balance_counter")]
    MaxBalanceCounter,
    #[serde(rename = "*min_balance")]
    MinBalance,
    #[serde(rename = "*max_balance")]
    MaxBalance,
    #[serde(rename = "*balance_expired")]
    BalanceExpired,
}

impl ThresholdType {
    /// Counter kind watched by counter thresholds
    pub fn counter_type(&self) -> Option<CounterType> {
        match self {
            ThresholdType::MinEventCounter | ThresholdType::MaxEventCounter => {
                Some(CounterType::Event)
            }
            ThresholdType::MinBalanceCounter | ThresholdType::MaxBalanceCounter => {
                Some(CounterType::Balance)
            }
            _ => None,
        }
    }

    pub fn is_max(&self) -> bool {
        matches!(
            self,
            ThresholdType::MaxEventCounter
                | ThresholdType::MaxBalanceCounter
                | ThresholdType::MaxBalance
        )
    }

    /// Whether `value` crosses `threshold` in this type's direction
    pub fn crossed(&self, value: Decimal, threshold: Decimal) -> bool {
        if self.is_max() {
            value >= threshold
        } else {
            value <= threshold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTrigger {
    /// Group id shared by triggers loaded together
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub unique_id: String,
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub threshold_value: Decimal,
    /// Re-arms itself after firing
    #[serde(default)]
    pub recurrent: bool,
    /// Minimum pause between two firings of a recurrent trigger
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub min_sleep: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<DateTime<Utc>>,
    /// Balances (or counters) the threshold watches
    #[serde(default)]
    pub balance: BalanceFilter,
    #[serde(default)]
    pub weight: Decimal,
    /// Action set run on firing
    pub actions_id: String,
    #[serde(default)]
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl ActionTrigger {
    pub fn new(threshold_type: ThresholdType, threshold_value: Decimal, actions_id: &str) -> Self {
        Self {
            id: String::new(),
            unique_id: String::new(),
            threshold_type,
            threshold_value,
            recurrent: false,
            min_sleep: Duration::zero(),
            expiration_date: None,
            activation_date: None,
            balance: BalanceFilter::default(),
            weight: Decimal::ZERO,
            actions_id: actions_id.to_string(),
            executed: false,
            last_executed_at: None,
        }
    }

    pub fn balance_type(&self) -> TrafficType {
        self.balance.balance_type()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiry| expiry < now)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.activation_date.map_or(true, |activation| activation <= now)
    }

    /// Not executed and, after a previous firing, rested for `min_sleep`
    pub fn is_armed_at(&self, now: DateTime<Utc>) -> bool {
        if self.executed {
            return false;
        }
        match self.last_executed_at {
            Some(last) if self.min_sleep > Duration::zero() => last + self.min_sleep <= now,
            _ => true,
        }
    }

    /// Record a firing; only non-recurrent triggers stay executed
    pub fn mark_fired(&mut self, now: DateTime<Utc>) {
        self.executed = !self.recurrent;
        self.last_executed_at = Some(now);
    }

    /// Whether `action` addresses this trigger; no action addresses all
    pub fn matches_action(&self, action: Option<&Action>) -> bool {
        let Some(action) = action else {
            return true;
        };
        if let Some(selector) = &action.trigger_filter {
            if selector.id.as_ref().is_some_and(|id| *id != self.id)
                || selector.unique_id.as_ref().is_some_and(|id| *id != self.unique_id)
                || selector
                    .threshold_type
                    .is_some_and(|tt| tt != self.threshold_type)
                || selector
                    .threshold_value
                    .is_some_and(|value| value != self.threshold_value)
            {
                return false;
            }
        }
        let Some(filter) = &action.balance else {
            return true;
        };
        if filter
            .balance_type
            .is_some_and(|tor| tor != self.balance_type())
        {
            return false;
        }
        self.balance.create_balance().match_filter(filter, true, false)
    }
}

/// Triggers of one account
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTriggers(pub Vec<ActionTrigger>);

impl Deref for ActionTriggers {
    type Target = Vec<ActionTrigger>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ActionTriggers {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ActionTriggers {
    /// Stable sort, heaviest first
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| b.weight.cmp(&a.weight));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::{ActionType, TriggerSelector};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 9, 24, 10, 48, 0).unwrap()
    }

    #[test]
    fn test_threshold_directions() {
        assert!(ThresholdType::MaxBalance.crossed(dec!(10), dec!(10)));
        assert!(!ThresholdType::MaxBalance.crossed(dec!(9), dec!(10)));
        assert!(ThresholdType::MinEventCounter.crossed(dec!(1), dec!(2)));
        assert_eq!(
            ThresholdType::MaxBalanceCounter.counter_type(),
            Some(CounterType::Balance)
        );
        assert_eq!(ThresholdType::BalanceExpired.counter_type(), None);
    }

    #[test]
    fn test_recurrent_trigger_honours_min_sleep() {
        let mut at = ActionTrigger::new(ThresholdType::MinBalance, dec!(2), "TOPUP");
        at.recurrent = true;
        at.min_sleep = Duration::minutes(5);
        assert!(at.is_armed_at(now()));
        at.mark_fired(now());
        assert!(!at.executed);
        assert!(!at.is_armed_at(now() + Duration::minutes(1)));
        assert!(at.is_armed_at(now() + Duration::minutes(5)));

        let mut once = ActionTrigger::new(ThresholdType::MinBalance, dec!(2), "TOPUP");
        once.mark_fired(now());
        assert!(once.executed);
        assert!(!once.is_armed_at(now() + Duration::days(1)));
    }

    #[test]
    fn test_activation_and_expiry() {
        let mut at = ActionTrigger::new(ThresholdType::MaxBalance, dec!(2), "LOG");
        at.activation_date = Some(now() + Duration::hours(1));
        at.expiration_date = Some(now() + Duration::hours(2));
        assert!(!at.is_active_at(now()));
        assert!(!at.is_expired_at(now()));
        assert!(at.is_active_at(now() + Duration::hours(1)));
        assert!(at.is_expired_at(now() + Duration::hours(3)));
    }

    #[test]
    fn test_matches_action() {
        let mut at = ActionTrigger::new(ThresholdType::MaxEventCounter, dec!(10), "LOG");
        at.id = "STANDARD_TRIGGERS".to_string();
        at.balance = BalanceFilter {
            balance_type: Some(TrafficType::Voice),
            weight: Some(dec!(20)),
            ..BalanceFilter::default()
        };
        assert!(at.matches_action(None));

        let same_type = Action::new(
            ActionType::ResetTriggers,
            Some(BalanceFilter {
                balance_type: Some(TrafficType::Voice),
                ..BalanceFilter::default()
            }),
        );
        assert!(at.matches_action(Some(&same_type)));

        let other_type = Action::new(
            ActionType::ResetTriggers,
            Some(BalanceFilter {
                balance_type: Some(TrafficType::Sms),
                ..BalanceFilter::default()
            }),
        );
        assert!(!at.matches_action(Some(&other_type)));

        let mut by_group = Action::new(ActionType::ResetTriggers, None);
        by_group.trigger_filter = Some(TriggerSelector {
            id: Some("OTHER".to_string()),
            ..TriggerSelector::default()
        });
        assert!(!at.matches_action(Some(&by_group)));
    }

    #[test]
    fn test_sort_by_weight() {
        let mut light = ActionTrigger::new(ThresholdType::MinBalance, dec!(1), "A");
        light.weight = dec!(10);
        let mut heavy = ActionTrigger::new(ThresholdType::MinBalance, dec!(1), "B");
        heavy.weight = dec!(20);
        let mut ats = ActionTriggers(vec![light, heavy]);
        ats.sort();
        assert_eq!(ats[0].actions_id, "B");
    }
}
