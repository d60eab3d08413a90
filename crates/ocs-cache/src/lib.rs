//! Redis-backed stores for the OCS rater
//!
//! Implements the account, shared-group, destination-index and action-set
//! collaborator traits from `ocs-core` on a single Redis connection.
//!
//! # Features
//!
//! - JSON values through serde_json
//! - Reverse destination index kept as Redis sets
//! - Empty balance maps never overwrite populated ones
//! - Redis errors converted to `AppError` by kind
//!
//! # Example
//!
//! ```no_run
//! use ocs_cache::RedisStore;
//! use ocs_core::traits::AccountStore;
//!
//! let store = RedisStore::new("redis://127.0.0.1:6379")?;
//! let account = store.get_account("cgrates.org:rif")?;
//! println!("{} balances", account.balance_map.len());
//! # Ok::<(), ocs_core::AppError>(())
//! ```

pub mod keys;

use ocs_core::models::{Account, Action, SharedGroup};
use ocs_core::traits::{AccountStore, ActionStore, DestinationIndex, SharedGroupStore};
use ocs_core::{AppError, AppResult};
use redis::{Client, Commands, Connection, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Redis store for accounts, shared groups, destinations and action sets
///
/// Calls are serialized on one connection; callers already hold the
/// account locks for the duration of an operation.
pub struct RedisStore {
    conn: Mutex<Connection>,
}

impl RedisStore {
    /// Connect to `url`
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the URL is invalid or the
    /// server is unreachable
    pub fn new(url: &str) -> AppResult<Self> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let conn = client.get_connection().map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ping(&self) -> AppResult<()> {
        let mut guard = self.conn();
        let _: String = redis::cmd("PING")
            .query(&mut *guard)
            .map_err(map_redis_error)?;
        Ok(())
    }

    /// Register destination `id` under each of `prefixes`
    pub fn add_destination(&self, id: &str, prefixes: &[String]) -> AppResult<()> {
        let mut guard = self.conn();
        for prefix in prefixes {
            let _: i64 = guard
                .sadd(keys::destination_key(prefix), id)
                .map_err(map_redis_error)?;
        }
        debug!("Indexed destination {} under {} prefixes", id, prefixes.len());
        Ok(())
    }

    pub fn set_actions(&self, id: &str, actions: &[Action]) -> AppResult<()> {
        self.put(&keys::actions_key(id), &actions)
    }

    #[cfg(test)]
    fn flush_db(&self) -> AppResult<()> {
        let mut guard = self.conn();
        let _: () = redis::cmd("FLUSHDB")
            .query(&mut *guard)
            .map_err(map_redis_error)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        debug!("GET {}", key);
        let json: Option<String> = self.conn().get(key).map_err(map_redis_error)?;
        match json {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        debug!("SET {}", key);
        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;
        let _: () = self.conn().set(key, json).map_err(map_redis_error)?;
        Ok(())
    }
}

/// Convert RedisError to AppError
fn map_redis_error(err: RedisError) -> AppError {
    match err.kind() {
        redis::ErrorKind::IoError => {
            error!("Redis I/O error: {}", err);
            AppError::CacheConnection(format!("I/O error: {}", err))
        }
        redis::ErrorKind::TypeError => {
            warn!("Redis type error: {}", err);
            AppError::Cache(format!("Type mismatch: {}", err))
        }
        _ => {
            error!("Redis error: {}", err);
            AppError::Cache(err.to_string())
        }
    }
}

impl AccountStore for RedisStore {
    fn get_account(&self, id: &str) -> AppResult<Account> {
        self.fetch(&keys::account_key(id))?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    fn set_account(&self, account: &Account) -> AppResult<()> {
        let key = keys::account_key(&account.id);
        let mut stored = account.clone();
        if let Some(existing) = self.fetch::<Account>(&key)? {
            stored.guard_overwrite(&existing);
        }
        self.put(&key, &stored)
    }
}

impl SharedGroupStore for RedisStore {
    fn get_shared_group(&self, id: &str) -> AppResult<SharedGroup> {
        self.fetch(&keys::shared_group_key(id))?
            .ok_or_else(|| AppError::SharedGroupNotFound(id.to_string()))
    }

    fn set_shared_group(&self, group: &SharedGroup) -> AppResult<()> {
        self.put(&keys::shared_group_key(&group.id), group)
    }
}

impl DestinationIndex for RedisStore {
    fn destination_ids(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .conn()
            .smembers(keys::destination_key(prefix))
            .map_err(map_redis_error)?;
        ids.sort();
        Ok(ids)
    }
}

impl ActionStore for RedisStore {
    fn get_actions(&self, id: &str) -> AppResult<Vec<Action>> {
        self.fetch(&keys::actions_key(id))?
            .ok_or_else(|| AppError::ActionsNotFound(id.to_string()))
    }
}
