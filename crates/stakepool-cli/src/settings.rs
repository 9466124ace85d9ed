//! CLI configuration types
//!
//! Loaded with the `config` crate from an optional TOML file and
//! `STAKEPOOL__<SECTION>__<KEY>` environment variables.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stakepool_core::prelude::*;
use stakepool_economics::{PoolConfiguration, RewardSchedule};
use std::path::Path;

/// Complete CLI configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pool parameters
    #[serde(default)]
    pub pool: PoolSettings,
}

impl AppConfig {
    /// Load from an optional TOML file, then apply `STAKEPOOL__SECTION__KEY`
    /// environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix("STAKEPOOL").separator("__"))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Color output
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: true,
        }
    }
}

/// Parameters of one staking pool deployment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Registry handle, e.g. `BTCDOM-long`
    #[serde(default = "default_pool_id")]
    pub id: String,

    #[serde(default = "default_owner")]
    pub owner: Address,

    #[serde(default = "default_staking_token")]
    pub staking_token: Address,

    #[serde(default = "default_reward_token")]
    pub reward_token: Address,

    /// Account holding both assets on behalf of the pool
    #[serde(default = "default_ledger_address")]
    pub ledger_address: Address,

    /// Reward in base units; strings allowed for values above `i64::MAX`
    #[serde(default = "default_total_reward_pool", with = "stakepool_core::amount_serde")]
    pub total_reward_pool: Amount,

    /// Absolute expiration; wins over `expiration_days`
    #[serde(default)]
    pub pool_expiration: Option<Timestamp>,

    /// Expiration relative to the start time
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,

    #[serde(default)]
    pub start_grace_secs: i64,

    /// Start time; the current time when absent
    #[serde(default)]
    pub start: Option<Timestamp>,
}

fn default_pool_id() -> String {
    "BTCDOM-long".to_string()
}

fn default_owner() -> Address {
    Address::repeat_byte(0x01)
}

fn default_staking_token() -> Address {
    Address::repeat_byte(0xAA)
}

fn default_reward_token() -> Address {
    Address::repeat_byte(0xBB)
}

fn default_ledger_address() -> Address {
    Address::repeat_byte(0x5A)
}

fn default_total_reward_pool() -> Amount {
    tokens(5_000_000)
}

fn default_expiration_days() -> i64 {
    182 // six months
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            id: default_pool_id(),
            owner: default_owner(),
            staking_token: default_staking_token(),
            reward_token: default_reward_token(),
            ledger_address: default_ledger_address(),
            total_reward_pool: default_total_reward_pool(),
            pool_expiration: None,
            expiration_days: default_expiration_days(),
            start_grace_secs: 0,
            start: None,
        }
    }
}

impl PoolSettings {
    pub fn pool_id(&self) -> PoolId {
        PoolId::new(self.id.clone())
    }

    /// Expiration given the time the pool is initialized
    pub fn expiration(&self, start: Timestamp) -> Timestamp {
        self.pool_expiration
            .unwrap_or_else(|| start.saturating_add(days(self.expiration_days)))
    }

    pub fn configuration(&self, start: Timestamp) -> PoolConfiguration {
        PoolConfiguration::new(
            self.staking_token,
            self.reward_token,
            self.owner,
            self.ledger_address,
            self.total_reward_pool,
            self.expiration(start),
        )
        .with_start_grace(self.start_grace_secs)
    }

    /// Schedule the pool would get if initialized at `start`
    pub fn schedule(&self, start: Timestamp) -> anyhow::Result<RewardSchedule> {
        let config = self.configuration(start);
        config.validate()?;
        let begins = start.checked_add(config.start_grace_secs).with_context(|| {
            format!("start {start} plus grace {}s is out of range", config.start_grace_secs)
        })?;
        Ok(RewardSchedule::new(begins, config.pool_expiration)?)
    }
}
