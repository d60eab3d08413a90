//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

use crate::AppResult;

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Debit engine configuration
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct EngineConfig {
    /// Ceiling on the number of increments generated for one time span
    #[serde(default = "default_max_increments")]
    #[validate(range(min = 1))]
    pub max_increments: usize,

    /// Decimals used when rounding per-increment costs
    #[serde(default = "default_rounding_decimals")]
    #[validate(range(max = 28))]
    pub rounding_decimals: u32,

    /// Shortest destination prefix considered when matching balances
    #[serde(default = "default_min_prefix_match")]
    #[validate(range(min = 1))]
    pub min_prefix_match: usize,

    /// Attempts to lock a stable shared-group member set before giving up
    #[serde(default = "default_lock_retries")]
    #[validate(range(min = 1))]
    pub lock_retries: u32,
}

fn default_max_increments() -> usize {
    1_000_000
}

fn default_rounding_decimals() -> u32 {
    10
}

fn default_min_prefix_match() -> usize {
    1
}

fn default_lock_retries() -> u32 {
    3
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("engine.max_increments", default_max_increments() as i64)?
            .set_default("engine.rounding_decimals", default_rounding_decimals() as i64)?
            .set_default("engine.min_prefix_match", default_min_prefix_match() as i64)?
            .set_default("engine.lock_retries", default_lock_retries() as i64)?
            .set_default("redis.url", default_redis_url())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with OCS_ prefix
            .add_source(
                Environment::with_prefix("OCS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("OCS").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> AppResult<()> {
        self.engine.validate()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_increments: default_max_increments(),
            rounding_decimals: default_rounding_decimals(),
            min_prefix_match: default_min_prefix_match(),
            lock_retries: default_lock_retries(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
