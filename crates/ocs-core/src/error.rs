//! Unified error handling for the OCS rater
//!
//! This module provides a single error type covering store failures,
//! charging outcomes and programmer errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main application error type
///
/// All errors in the charging core should be converted to this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Charging Errors ====================
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    #[error("Shared group not found: {0}")]
    SharedGroupNotFound(String),

    #[error("Action set not found: {0}")]
    ActionsNotFound(String),

    #[error("Rating not found for subject: {0}")]
    RatingNotFound(String),

    #[error("Balance not found: {0}")]
    BalanceNotFound(String),

    #[error("Not enough credit on account {account}: {unpaid} left unpaid")]
    InsufficientCredit { account: String, unpaid: Decimal },

    #[error("nil action")]
    NilAction,

    #[error("nil balance")]
    NilBalance,

    #[error("Call descriptor has no rated call cost")]
    MissingCallCost,

    #[error("Account {0} is not covered by the held lock")]
    LockNotHeld(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Concurrency Errors ====================
    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the stable error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::AccountDisabled(_) => "account_disabled",
            AppError::SharedGroupNotFound(_) => "shared_group_not_found",
            AppError::ActionsNotFound(_) => "actions_not_found",
            AppError::RatingNotFound(_) => "rating_not_found",
            AppError::BalanceNotFound(_) => "balance_not_found",
            AppError::InsufficientCredit { .. } => "insufficient_credit",
            AppError::NilAction => "nil_action",
            AppError::NilBalance => "nil_balance",
            AppError::MissingCallCost => "missing_call_cost",
            AppError::LockNotHeld(_) => "lock_not_held",
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
