//! Redis key naming for the OCS stores
//!
//! # Key Patterns
//!
//! - `account:{tenant:account}` - Serialized account with its balances,
//!   counters and triggers
//! - `shared_group:{id}` - Serialized shared group definition
//! - `destination:{prefix}` - Set of destination ids containing the prefix
//! - `actions:{id}` - Serialized action set
//!
//! # Example
//!
//! ```
//! use ocs_cache::keys;
//!
//! assert_eq!(keys::account_key("cgrates.org:rif"), "account:cgrates.org:rif");
//! assert_eq!(keys::destination_key("0723"), "destination:0723");
//! ```

/// Prefix for accounts
///
/// Format: `account:{account_id}`
pub const ACCOUNT_PREFIX: &str = "account";

/// Prefix for shared groups
///
/// Format: `shared_group:{group_id}`
pub const SHARED_GROUP_PREFIX: &str = "shared_group";

/// Prefix for the reverse destination index
///
/// Format: `destination:{prefix}`
pub const DESTINATION_PREFIX: &str = "destination";

/// Prefix for action sets
///
/// Format: `actions:{actions_id}`
pub const ACTIONS_PREFIX: &str = "actions";

/// Build the key of an account by its tenant-qualified id
pub fn account_key(account_id: &str) -> String {
    format!("{}:{}", ACCOUNT_PREFIX, account_id)
}

pub fn shared_group_key(group_id: &str) -> String {
    format!("{}:{}", SHARED_GROUP_PREFIX, group_id)
}

/// Build the key of the destination id set for a number prefix
///
/// # Example
///
/// ```
/// use ocs_cache::keys::destination_key;
///
/// assert_eq!(destination_key("40723"), "destination:40723");
/// ```
pub fn destination_key(prefix: &str) -> String {
    format!("{}:{}", DESTINATION_PREFIX, prefix)
}

pub fn actions_key(actions_id: &str) -> String {
    format!("{}:{}", ACTIONS_PREFIX, actions_id)
}

/// Build a pattern matching every key with `prefix`
///
/// # Warning
///
/// Scanning keys is expensive on large datasets; meant for tooling only.
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}
