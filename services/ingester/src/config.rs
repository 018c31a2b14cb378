//! Ingester configuration.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use storage::StoreConfig;
use workers::RetryPolicy;

/// Top-level ingester configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    /// Observation store connection
    pub store: StoreConfig,

    /// Redis URL of the ingestion stream
    pub redis_url: String,

    /// Consumer name within the ingestion group; unique per replica
    pub consumer_name: String,

    /// Backoff for transient store write failures
    pub retry: RetryPolicy,

    /// Seconds between replays of entries left uncommitted
    pub reclaim_interval_secs: u64,

    /// Port of the status/metrics HTTP server
    pub status_port: u16,

    /// Lines per round trip for the `publish` subcommand
    pub publish_batch_size: usize,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            redis_url: "redis://redis:6379".to_string(),
            consumer_name: "ingester-1".to_string(),
            retry: RetryPolicy::default(),
            reclaim_interval_secs: 60,
            status_port: 8082,
            publish_batch_size: 500,
        }
    }
}

impl IngesterConfig {
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    /// Load configuration from a YAML file; missing keys take defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let store = StoreConfig {
            database_url: var("DATABASE_URL").unwrap_or(defaults.store.database_url),
            keyspace: var("STORE_KEYSPACE").unwrap_or(defaults.store.keyspace),
            max_connections: parse_var(&var, "STORE_MAX_CONNECTIONS", defaults.store.max_connections)?,
            acquire_timeout_secs: parse_var(
                &var,
                "STORE_ACQUIRE_TIMEOUT_SECS",
                defaults.store.acquire_timeout_secs,
            )?,
        };

        let retry = RetryPolicy {
            max_attempts: parse_var(&var, "INGEST_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            initial_delay_ms: parse_var(
                &var,
                "INGEST_RETRY_INITIAL_MS",
                defaults.retry.initial_delay_ms,
            )?,
            max_delay_ms: parse_var(&var, "INGEST_RETRY_MAX_MS", defaults.retry.max_delay_ms)?,
        };

        let config = Self {
            store,
            redis_url: var("REDIS_URL").unwrap_or(defaults.redis_url),
            consumer_name: var("INGESTER_CONSUMER").unwrap_or(defaults.consumer_name),
            retry,
            reclaim_interval_secs: parse_var(
                &var,
                "INGEST_RECLAIM_INTERVAL_SECS",
                defaults.reclaim_interval_secs,
            )?,
            status_port: parse_var(&var, "STATUS_PORT", defaults.status_port)?,
            publish_batch_size: parse_var(&var, "PUBLISH_BATCH_SIZE", defaults.publish_batch_size)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            bail!("retry.initial_delay_ms exceeds retry.max_delay_ms");
        }
        if self.reclaim_interval_secs == 0 {
            bail!("reclaim_interval_secs must be at least 1");
        }
        if self.consumer_name.trim().is_empty() {
            bail!("consumer_name must not be empty");
        }
        if self.publish_batch_size == 0 {
            bail!("publish_batch_size must be at least 1");
        }
        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, value, e)),
        None => Ok(default),
    }
}
