//! Engine tuning loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::shard::{Shard, ShardError};

/// Scheduler and evaluator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time between sweeps.
    pub sweep_interval: Duration,
    /// Evaluations running at once within a sweep.
    pub max_concurrency: usize,
    /// How stale cached tenant configuration may get.
    pub config_ttl: Duration,
    /// Age after which an uncommitted claim is treated as delivered.
    pub claim_timeout: Duration,
    /// Failures in a row before every further failure raises an alert.
    pub max_consecutive_send_failures: u32,
    /// Silence required before a conversation becomes a candidate.
    pub min_idle: Duration,
    pub shard: Shard,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            max_concurrency: 16,
            config_ttl: Duration::from_secs(30),
            claim_timeout: Duration::from_secs(300),
            max_consecutive_send_failures: 5,
            min_idle: Duration::from_secs(60),
            shard: Shard::single(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `REACTIVATION_SWEEP_SECS` | Seconds between sweeps | `60` |
    /// | `REACTIVATION_WORKERS` | Concurrent evaluations | `16` |
    /// | `REACTIVATION_CONFIG_TTL_SECS` | Configuration cache TTL | `30` |
    /// | `REACTIVATION_CLAIM_TIMEOUT_SECS` | Stale claim timeout | `300` |
    /// | `REACTIVATION_MAX_SEND_FAILURES` | Alert threshold | `5` |
    /// | `REACTIVATION_MIN_IDLE_MINUTES` | Idle time before evaluation | `1` |
    /// | `REACTIVATION_SHARD` | `index/count` | `0/1` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sweep_interval = Duration::from_secs(parse_var("REACTIVATION_SWEEP_SECS", 60u64)?);
        let max_concurrency = parse_var("REACTIVATION_WORKERS", defaults.max_concurrency)?;
        let config_ttl = Duration::from_secs(parse_var("REACTIVATION_CONFIG_TTL_SECS", 30u64)?);
        let claim_timeout = Duration::from_secs(parse_var("REACTIVATION_CLAIM_TIMEOUT_SECS", 300u64)?);
        let max_consecutive_send_failures =
            parse_var("REACTIVATION_MAX_SEND_FAILURES", defaults.max_consecutive_send_failures)?;
        let min_idle = minutes(
            "REACTIVATION_MIN_IDLE_MINUTES",
            parse_var("REACTIVATION_MIN_IDLE_MINUTES", 1u64)?,
        )?;

        let shard = match env::var("REACTIVATION_SHARD") {
            Ok(value) => value.parse().map_err(ConfigError::InvalidShard)?,
            Err(_) => defaults.shard,
        };

        let config = Self {
            sweep_interval,
            max_concurrency,
            config_ttl,
            claim_timeout,
            max_consecutive_send_failures,
            min_idle,
            shard,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroValue("REACTIVATION_SWEEP_SECS"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroValue("REACTIVATION_WORKERS"));
        }
        if self.claim_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("REACTIVATION_CLAIM_TIMEOUT_SECS"));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}

fn minutes(name: &'static str, value: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(60)
        .filter(|secs| i64::try_from(*secs).is_ok())
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("Invalid REACTIVATION_SHARD: {0}")]
    InvalidShard(#[from] ShardError),
}
