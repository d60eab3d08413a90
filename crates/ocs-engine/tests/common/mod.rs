//! Fixtures shared by the engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ocs_core::config::EngineConfig;
use ocs_core::models::{
    Account, Balance, CallDescriptor, RIRate, Rate, RateInterval, TrafficType,
};
use ocs_engine::{AccountService, Engine, MemoryStore, Stores};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const RIF: &str = "cgrates.org:rif";
pub const GROUPIE: &str = "cgrates.org:groupie";

pub fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
}

/// Flat tariff: `value` per `unit_s` seconds, billed every `increment_s`
pub fn tariff(value: Decimal, increment_s: i64, unit_s: i64, connect_fee: Decimal) -> RateInterval {
    RateInterval {
        rating: RIRate {
            connect_fee,
            rates: vec![Rate {
                group_interval_start: Duration::zero(),
                value,
                rate_increment: Duration::seconds(increment_s),
                rate_unit: Duration::seconds(unit_s),
            }],
            ..RIRate::default()
        },
        ..RateInterval::default()
    }
}

pub fn call(account: &str, tor: TrafficType, seconds: i64) -> CallDescriptor {
    let start = session_start();
    CallDescriptor {
        tenant: "cgrates.org".to_string(),
        account: account.to_string(),
        subject: "rif".to_string(),
        category: "call".to_string(),
        destination: "0723045326".to_string(),
        tor,
        time_start: start,
        time_end: start + Duration::seconds(seconds),
        rating_infos: Vec::new(),
        call_cost: None,
    }
}

pub fn money(uuid: &str, value: Decimal) -> Balance {
    Balance {
        uuid: uuid.to_string(),
        id: uuid.to_string(),
        value,
        ..Balance::default()
    }
}

pub fn account_with(id: &str, tor: TrafficType, balances: Vec<Balance>) -> Account {
    let mut account = Account::new(id);
    account.balances_mut(tor).0 = balances;
    account
}

pub fn service(store: Arc<MemoryStore>) -> AccountService {
    service_with(store, EngineConfig::default())
}

pub fn service_with(store: Arc<MemoryStore>, config: EngineConfig) -> AccountService {
    AccountService::new(Engine::new(Stores::in_memory(store), config))
}

pub fn balance_value(service: &AccountService, account: &str, tor: TrafficType, uuid: &str) -> Decimal {
    service
        .get_account(account)
        .unwrap()
        .find_balance(tor, uuid)
        .map(|b| b.value)
        .unwrap()
}
