//! OCS rater fixture runner
//!
//! Loads a JSON scenario (accounts, shared groups, destinations, action
//! sets, ratings and one call descriptor), charges the call through the
//! locked account service and prints the outcome as JSON.

mod fixture;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixture::Fixture;
use ocs_cache::RedisStore;
use ocs_core::config::AppConfig;
use ocs_core::models::{Account, CallCost};
use ocs_engine::{AccountService, DebitOptions, Engine, MemoryStore, Stores};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Charge a call scenario against account balances")]
struct Cli {
    /// Config file to use instead of config/default and config/{RUN_MODE}
    #[arg(long)]
    conf: Option<String>,

    /// Keep accounts, groups, destinations and actions in Redis
    #[arg(long)]
    redis: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Debit the fixture call
    Debit {
        fixture: PathBuf,
        /// Price and walk the balances without storing anything
        #[arg(long)]
        dry_run: bool,
        /// Bill what the balances cannot cover to the default balance
        #[arg(long)]
        force_duration: bool,
    },
    /// Longest part of the fixture call the account can pay for
    MaxDuration { fixture: PathBuf },
    /// Debit the fixture call, then refund it
    Refund { fixture: PathBuf },
}

#[derive(Serialize)]
struct Report {
    call_cost: CallCost,
    #[serde(skip_serializing_if = "Option::is_none")]
    insufficient_credit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_duration_secs: Option<i64>,
    accounts: Vec<Account>,
}

/// Initialize tracing/logging
fn init_tracing(config: &AppConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let level = &config.logging.level;
            EnvFilter::new(format!(
                "ocs_rater={},ocs_engine={},ocs_cache={},ocs_core={}",
                level, level, level, level
            ))
        });

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.logging.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.conf {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

/// Seed the stores from `fixture` and build the service on top of them
fn build_service(fixture: &Fixture, config: &AppConfig, use_redis: bool) -> Result<AccountService> {
    let memory = Arc::new(MemoryStore::new());
    fixture.load_memory(&memory);

    let stores = if use_redis {
        let redis = Arc::new(RedisStore::new(&config.redis.url)?);
        redis.ping()?;
        fixture.load_redis(&redis)?;
        info!("Using Redis at {}", config.redis.url);
        Stores {
            accounts: redis.clone(),
            shared_groups: redis.clone(),
            destinations: redis.clone(),
            actions: redis,
            rating: memory,
        }
    } else {
        Stores::in_memory(memory)
    };

    Ok(AccountService::new(Engine::new(stores, config.engine.clone())))
}

fn read_fixture(path: &Path) -> Result<Fixture> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    Fixture::from_json(&json).with_context(|| format!("Invalid fixture {}", path.display()))
}

fn accounts_of(service: &AccountService, fixture: &Fixture) -> Result<Vec<Account>> {
    fixture
        .account_ids()
        .iter()
        .map(|id| service.get_account(id).map_err(anyhow::Error::from))
        .collect()
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);

    info!("Starting OCS rater v{}", env!("CARGO_PKG_VERSION"));

    let report = match &cli.command {
        Command::Debit {
            fixture,
            dry_run,
            force_duration,
        } => {
            let fixture = read_fixture(fixture)?;
            let service = build_service(&fixture, &config, cli.redis)?;
            let opts = DebitOptions {
                dry_run: *dry_run || fixture.options.dry_run,
                force_duration: *force_duration || fixture.options.force_duration,
            };
            let outcome = service.debit(&fixture.call, opts)?;
            if let Some(err) = &outcome.insufficient_credit {
                warn!(code = err.error_code(), "Session not fully covered: {}", err);
            }
            Report {
                call_cost: outcome.call_cost,
                insufficient_credit: outcome.insufficient_credit.map(|e| e.to_string()),
                max_duration_secs: None,
                accounts: accounts_of(&service, &fixture)?,
            }
        }
        Command::MaxDuration { fixture } => {
            let fixture = read_fixture(fixture)?;
            let service = build_service(&fixture, &config, cli.redis)?;
            let opts = DebitOptions {
                dry_run: true,
                force_duration: false,
            };
            let outcome = service.debit(&fixture.call, opts)?;
            Report {
                max_duration_secs: Some(outcome.call_cost.duration().num_seconds()),
                call_cost: outcome.call_cost,
                insufficient_credit: outcome.insufficient_credit.map(|e| e.to_string()),
                accounts: accounts_of(&service, &fixture)?,
            }
        }
        Command::Refund { fixture } => {
            let fixture = read_fixture(fixture)?;
            let service = build_service(&fixture, &config, cli.redis)?;
            let outcome = service.debit(&fixture.call, fixture.options)?;
            let mut cd = fixture.call.clone();
            cd.call_cost = Some(outcome.call_cost.clone());
            service.refund(&cd)?;
            Report {
                call_cost: outcome.call_cost,
                insufficient_credit: outcome.insufficient_credit.map(|e| e.to_string()),
                max_duration_secs: None,
                accounts: accounts_of(&service, &fixture)?,
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
