//! Balance actions run by triggers and administrative calls

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::action_trigger::ThresholdType;
use super::balance_filter::BalanceFilter;
use super::traffic::TrafficType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "*topup")]
    Topup,
    #[serde(rename = "*topup_reset")]
    TopupReset,
    #[serde(rename = "*debit")]
    Debit,
    #[serde(rename = "*debit_reset")]
    DebitReset,
    #[serde(rename = "*reset_triggers")]
    ResetTriggers,
    #[serde(rename = "*set_recurrent")]
    SetRecurrent,
    #[serde(rename = "*unset_recurrent")]
    UnsetRecurrent,
    #[serde(rename = "*reset_counters")]
    ResetCounters,
    #[serde(rename = "*enable_balance")]
    EnableBalance,
    #[serde(rename = "*disable_balance")]
    DisableBalance,
    #[serde(rename = "*allow_negative")]
    AllowNegative,
    #[serde(rename = "*deny_negative")]
    DenyNegative,
    #[serde(rename = "*enable_account")]
    EnableAccount,
    #[serde(rename = "*disable_account")]
    DisableAccount,
    #[serde(rename = "*log")]
    Log,
}

/// Narrows the triggers an action applies to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_type: Option<ThresholdType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: String,
    pub action_type: ActionType,
    /// Balances the action applies to; amount in `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_filter: Option<TriggerSelector>,
    #[serde(default)]
    pub weight: Decimal,
}

impl Action {
    pub fn new(action_type: ActionType, balance: Option<BalanceFilter>) -> Self {
        Self {
            id: String::new(),
            action_type,
            balance,
            trigger_filter: None,
            weight: Decimal::ZERO,
        }
    }

    /// Traffic type of the targeted balances, money when unset
    pub fn balance_type(&self) -> TrafficType {
        self.balance
            .as_ref()
            .map(BalanceFilter::balance_type)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_action_json() {
        let json = r#"{
            "id": "TOPUP10",
            "action_type": "*topup",
            "balance": {"type": "*voice", "value": 10, "weight": 20},
            "weight": 10
        }"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(action.action_type, ActionType::Topup);
        assert_eq!(action.balance_type(), TrafficType::Voice);
        assert_eq!(action.balance.as_ref().and_then(|b| b.value), Some(dec!(10)));
        assert!(action.trigger_filter.is_none());
    }

    #[test]
    fn test_balance_type_defaults_to_money() {
        let action = Action::new(ActionType::Log, None);
        assert_eq!(action.balance_type(), TrafficType::Monetary);
    }
}
