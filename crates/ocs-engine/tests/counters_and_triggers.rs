mod common;

use common::*;
use ocs_core::models::{
    Action, ActionTrigger, ActionType, BalanceFilter, CounterType, SharedGroup, ThresholdType,
    TrafficType,
};
use ocs_core::traits::SharedGroupStore;
use ocs_engine::{DebitOptions, MemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn topup(id: &str, value: Decimal) -> Action {
    Action::new(
        ActionType::Topup,
        Some(BalanceFilter {
            id: Some(id.to_string()),
            balance_type: Some(TrafficType::Monetary),
            value: Some(value),
            ..BalanceFilter::default()
        }),
    )
}

fn money_filter() -> BalanceFilter {
    BalanceFilter {
        balance_type: Some(TrafficType::Monetary),
        ..BalanceFilter::default()
    }
}

#[test]
fn test_low_balance_trigger_tops_up_after_debit() {
    let store = Arc::new(MemoryStore::new());
    store.set_rating("rif", tariff(dec!(1), 60, 60, Decimal::ZERO));
    store.set_actions("TOPUP_100", vec![topup("main", dec!(100))]);
    let mut account = account_with(RIF, TrafficType::Monetary, vec![money("main", dec!(10))]);
    account
        .action_triggers
        .push(ActionTrigger::new(ThresholdType::MinBalance, dec!(5), "TOPUP_100"));
    store.insert_account(account);
    let service = service(store);

    service
        .debit(&call(RIF, TrafficType::Voice, 360), DebitOptions::default())
        .unwrap();

    let account = service.get_account(RIF).unwrap();
    assert_eq!(account.find_balance(TrafficType::Monetary, "main").unwrap().value, dec!(104));
    assert!(account.action_triggers[0].executed);

    // fired once: a second debit below the threshold does not top up again
    service
        .debit(&call(RIF, TrafficType::Voice, 60), DebitOptions::default())
        .unwrap();
    assert_eq!(
        balance_value(&service, RIF, TrafficType::Monetary, "main"),
        dec!(103)
    );
}

#[test]
fn test_dry_run_moves_no_counters() {
    let store = Arc::new(MemoryStore::new());
    store.set_rating("rif", tariff(dec!(1), 60, 60, Decimal::ZERO));
    let mut account = account_with(RIF, TrafficType::Monetary, vec![money("main", dec!(10))]);
    let mut at = ActionTrigger::new(ThresholdType::MaxBalanceCounter, dec!(1000), "NONE");
    at.balance = money_filter();
    account.action_triggers.push(at);
    store.insert_account(account);
    let service = service(store);
    service.init_counters(RIF).unwrap();

    let dry = DebitOptions {
        dry_run: true,
        force_duration: false,
    };
    service.debit(&call(RIF, TrafficType::Voice, 120), dry).unwrap();
    let account = service.get_account(RIF).unwrap();
    assert_eq!(
        account
            .unit_counters
            .value_of(TrafficType::Monetary, CounterType::Balance, &money_filter()),
        Some(Decimal::ZERO)
    );

    service
        .debit(&call(RIF, TrafficType::Voice, 120), DebitOptions::default())
        .unwrap();
    let account = service.get_account(RIF).unwrap();
    assert_eq!(
        account
            .unit_counters
            .value_of(TrafficType::Monetary, CounterType::Balance, &money_filter()),
        Some(dec!(2))
    );
}

#[test]
fn test_refund_credits_usage_but_not_connect_fee() {
    let store = Arc::new(MemoryStore::new());
    store.set_rating("rif", tariff(dec!(1), 60, 60, dec!(0.5)));
    let mut account = account_with(RIF, TrafficType::Monetary, vec![money("main", dec!(10))]);
    let mut at = ActionTrigger::new(ThresholdType::MaxBalanceCounter, dec!(1000), "NONE");
    at.balance = money_filter();
    account.action_triggers.push(at);
    store.insert_account(account);
    let service = service(store);
    service.init_counters(RIF).unwrap();

    let mut cd = call(RIF, TrafficType::Voice, 120);
    let outcome = service.debit(&cd, DebitOptions::default()).unwrap();
    assert_eq!(
        balance_value(&service, RIF, TrafficType::Monetary, "main"),
        dec!(7.5)
    );

    cd.call_cost = Some(outcome.call_cost);
    service.refund(&cd).unwrap();

    let account = service.get_account(RIF).unwrap();
    assert_eq!(account.find_balance(TrafficType::Monetary, "main").unwrap().value, dec!(9.5));
    assert_eq!(
        account
            .unit_counters
            .value_of(TrafficType::Monetary, CounterType::Balance, &money_filter()),
        Some(dec!(0.5))
    );
}

#[test]
fn test_refund_of_flat_units() {
    let store = Arc::new(MemoryStore::new());
    store.set_rating("rif", tariff(dec!(1), 1, 60, Decimal::ZERO));
    let minutes = ocs_core::models::Balance {
        uuid: "voice-min".to_string(),
        value: dec!(120),
        rating_subject: "*zero1m".to_string(),
        ..Default::default()
    };
    store.insert_account(account_with(RIF, TrafficType::Voice, vec![minutes]));
    let service = service(store);

    let mut cd = call(RIF, TrafficType::Voice, 30);
    let outcome = service.debit(&cd, DebitOptions::default()).unwrap();
    assert_eq!(
        balance_value(&service, RIF, TrafficType::Voice, "voice-min"),
        dec!(60)
    );
    cd.call_cost = Some(outcome.call_cost);
    service.refund(&cd).unwrap();
    assert_eq!(
        balance_value(&service, RIF, TrafficType::Voice, "voice-min"),
        dec!(120)
    );
}

#[test]
fn test_reset_counters_leaves_other_types() {
    let store = Arc::new(MemoryStore::new());
    let mut account = account_with(RIF, TrafficType::Monetary, vec![money("main", dec!(10))]);
    for tor in [TrafficType::Voice, TrafficType::Sms] {
        let mut at = ActionTrigger::new(ThresholdType::MaxEventCounter, dec!(100), "NONE");
        at.balance.balance_type = Some(tor);
        account.action_triggers.push(at);
    }
    store.insert_account(account);
    let service = service(store.clone());
    service.init_counters(RIF).unwrap();

    let mut account = service.get_account(RIF).unwrap();
    for tor in [TrafficType::Voice, TrafficType::Sms] {
        account.unit_counters.get_mut(&tor).unwrap()[0].counters[0].value = dec!(7);
    }
    store.insert_account(account);

    let reset = Action::new(
        ActionType::ResetCounters,
        Some(BalanceFilter {
            balance_type: Some(TrafficType::Voice),
            ..BalanceFilter::default()
        }),
    );
    service.apply_action(RIF, &reset).unwrap();

    let account = service.get_account(RIF).unwrap();
    let voice = BalanceFilter {
        balance_type: Some(TrafficType::Voice),
        ..BalanceFilter::default()
    };
    assert_eq!(
        account
            .unit_counters
            .value_of(TrafficType::Voice, CounterType::Event, &voice),
        Some(Decimal::ZERO)
    );
    assert_eq!(
        account
            .unit_counters
            .value_of(TrafficType::Sms, CounterType::Event, &voice),
        Some(dec!(7))
    );
}

#[test]
fn test_topup_action_enrols_and_fires_triggers() {
    let store = Arc::new(MemoryStore::new());
    store.insert_shared_group(SharedGroup {
        id: "SG_FAMILY".to_string(),
        ..SharedGroup::default()
    });
    store.set_actions("DISABLE", vec![Action::new(ActionType::DisableAccount, None)]);
    let mut account = account_with(RIF, TrafficType::Monetary, vec![]);
    account
        .action_triggers
        .push(ActionTrigger::new(ThresholdType::MaxBalance, dec!(1000), "DISABLE"));
    store.insert_account(account);
    let service = service(store.clone());

    let mut filter = BalanceFilter {
        id: Some("family".to_string()),
        balance_type: Some(TrafficType::Monetary),
        value: Some(dec!(1500)),
        ..BalanceFilter::default()
    };
    filter.shared_groups = Some(["SG_FAMILY".to_string()].into());
    service
        .apply_action(RIF, &Action::new(ActionType::Topup, Some(filter)))
        .unwrap();

    let account = service.get_account(RIF).unwrap();
    assert_eq!(account.total_value(TrafficType::Monetary), dec!(1500));
    assert!(account.disabled);
    let group = store.get_shared_group("SG_FAMILY").unwrap();
    assert!(group.member_ids.contains(RIF));
}

#[test]
fn test_recurrent_trigger_fires_again() {
    let store = Arc::new(MemoryStore::new());
    store.set_rating("rif", tariff(dec!(1), 60, 60, Decimal::ZERO));
    store.set_actions("TOPUP_5", vec![topup("main", dec!(5))]);
    let mut account = account_with(RIF, TrafficType::Monetary, vec![money("main", dec!(3))]);
    account
        .action_triggers
        .push(ActionTrigger::new(ThresholdType::MinBalance, dec!(2), "TOPUP_5"));
    store.insert_account(account);
    let service = service(store);

    let recurrent = Action::new(ActionType::SetRecurrent, None);
    service.set_recurrent(RIF, Some(&recurrent), true).unwrap();

    for _ in 0..2 {
        service
            .debit(&call(RIF, TrafficType::Voice, 60), DebitOptions::default())
            .unwrap();
    }
    // 3 - 1 = 2 fires (+5) -> 7, 7 - 1 = 6 stays above
    assert_eq!(
        balance_value(&service, RIF, TrafficType::Monetary, "main"),
        dec!(6)
    );
    let account = service.get_account(RIF).unwrap();
    assert!(!account.action_triggers[0].executed);
    assert!(account.action_triggers[0].last_executed_at.is_some());
}
