//! Domain models for the OCS rater
//!
//! This module contains all the core charging entities used throughout
//! the system.

pub mod account;
pub mod action;
pub mod action_trigger;
pub mod balance;
pub mod balance_filter;
pub mod call_cost;
pub mod destination;
pub mod increment;
pub mod rate;
pub mod shared_group;
pub mod timespan;
pub mod traffic;
pub mod unit_counter;

pub use account::Account;
pub use action::{Action, ActionType, TriggerSelector};
pub use action_trigger::{ActionTrigger, ActionTriggers, ThresholdType};
pub use balance::{Balance, Balances};
pub use balance_filter::BalanceFilter;
pub use call_cost::{CallCost, CallDescriptor};
pub use destination::ResolvedDestination;
pub use increment::{DebitInfo, Increment, Increments, MonetaryInfo, UnitInfo};
pub use rate::{RIRate, RITiming, Rate, RateInterval, RoundingMethod};
pub use shared_group::{SharedGroup, SharingParameters, SharingStrategy};
pub use timespan::{RatingInfo, TimeSpan, TimeSpans};
pub use traffic::{RatingSubject, TrafficType};
pub use unit_counter::{CounterFilter, CounterType, UnitCounter, UnitCounters};
