//! OCS Core Library
//!
//! This crate provides the foundational charging types, traits, and error
//! handling for the OCS rater. It includes:
//!
//! - Domain models (Account, Balance, TimeSpan, CallCost, triggers, etc.)
//! - Collaborator traits for stores, destination lookup and rating
//! - Unified error handling
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;
pub mod utils;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Well-known identifiers shared across the charging models
pub mod consts {
    /// Destination identifier matching every destination
    pub const META_ANY: &str = "*any";

    /// Identifier of the account's default money balance
    pub const META_DEFAULT: &str = "*default";

    /// Weight given to a lazily created default money balance
    pub const DEFAULT_BALANCE_WEIGHT: i64 = 999;

    /// Rating subject consuming one second of value per elapsed second
    pub const ZERO_RATING_PER_SECOND: &str = "*zero1s";

    /// Rating subject consuming one minute of value per started minute
    pub const ZERO_RATING_PER_MINUTE: &str = "*zero1m";
}
