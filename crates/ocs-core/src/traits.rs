//! Collaborator traits consumed by the charging core
//!
//! Every operation of the charging core is synchronous; implementations
//! must be shareable across threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Account, Action, RateInterval, SharedGroup, TrafficType};

/// Account persistence
pub trait AccountStore: Send + Sync {
    /// Load an account, `AppError::AccountNotFound` when absent
    fn get_account(&self, id: &str) -> Result<Account, AppError>;

    /// Persist an account.
    ///
    /// Implementations must apply [`Account::guard_overwrite`] so an empty
    /// balance map never replaces a populated one.
    fn set_account(&self, account: &Account) -> Result<(), AppError>;
}

/// Shared group persistence
pub trait SharedGroupStore: Send + Sync {
    /// Load a shared group, `AppError::SharedGroupNotFound` when absent
    fn get_shared_group(&self, id: &str) -> Result<SharedGroup, AppError>;

    /// Persist a shared group
    fn set_shared_group(&self, group: &SharedGroup) -> Result<(), AppError>;
}

/// Reverse destination index: prefix to destination ids
pub trait DestinationIndex: Send + Sync {
    /// Destination ids containing exactly `prefix`
    fn destination_ids(&self, prefix: &str) -> Result<Vec<String>, AppError>;
}

/// Action set lookup for triggers
pub trait ActionStore: Send + Sync {
    /// Actions of the set `id`, `AppError::ActionsNotFound` when absent
    fn get_actions(&self, id: &str) -> Result<Vec<Action>, AppError>;
}

/// Parameters of a rating lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRequest {
    pub tenant: String,
    pub subject: String,
    pub category: String,
    pub destination: String,
    pub tor: TrafficType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

/// Rating-plan resolution
pub trait RatingResolver: Send + Sync {
    /// Pricing rule for the request, `None` when the subject has no rating
    fn resolve(&self, request: &RatingRequest) -> Result<Option<RateInterval>, AppError>;
}
