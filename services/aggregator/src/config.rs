//! Aggregator configuration.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use storage::StoreConfig;
use workers::AggregationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Observation store connection
    pub store: StoreConfig,

    /// Port of the HTTP API
    pub http_port: u16,

    /// How long an HTTP caller waits for a worker reply
    pub request_timeout_ms: u64,

    /// Worker layout and background ticks
    pub workers: AggregationConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            http_port: 8080,
            request_timeout_ms: 5000,
            workers: AggregationConfig::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
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
        let mut workers = defaults.workers.clone();

        if let Some(years) = var("DAILY_YEARS") {
            workers.daily_years = parse_list(&years, "DAILY_YEARS")?;
        }
        if let Some(stations) = var("TRACKED_STATIONS") {
            workers.tracked_stations = parse_list(&stations, "TRACKED_STATIONS")?;
        }
        workers.daily_tick_interval_ms =
            parse_var(&var, "DAILY_TICK_INTERVAL_MS", workers.daily_tick_interval_ms)?;
        workers.summary_period_secs =
            parse_var(&var, "SUMMARY_PERIOD_SECS", workers.summary_period_secs)?;
        workers.mailbox.capacity = parse_var(&var, "MAILBOX_CAPACITY", workers.mailbox.capacity)?;
        workers.mailbox.max_in_flight =
            parse_var(&var, "MAILBOX_MAX_IN_FLIGHT", workers.mailbox.max_in_flight)?;

        let config = Self {
            store: StoreConfig {
                database_url: var("DATABASE_URL").unwrap_or(defaults.store.database_url),
                keyspace: var("STORE_KEYSPACE").unwrap_or(defaults.store.keyspace),
                max_connections: parse_var(
                    &var,
                    "STORE_MAX_CONNECTIONS",
                    defaults.store.max_connections,
                )?,
                acquire_timeout_secs: parse_var(
                    &var,
                    "STORE_ACQUIRE_TIMEOUT_SECS",
                    defaults.store.acquire_timeout_secs,
                )?,
            },
            http_port: parse_var(&var, "HTTP_PORT", defaults.http_port)?,
            request_timeout_ms: parse_var(&var, "REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?,
            workers,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be positive");
        }
        self.workers
            .validate()
            .map_err(|e| anyhow!("Invalid worker configuration: {}", e))
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
            .map_err(|e| anyhow!("Invalid {}='{}': {}", key, value, e)),
        None => Ok(default),
    }
}

/// Comma-separated values; blanks are skipped.
fn parse_list<T>(value: &str, key: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .map_err(|e| anyhow!("Invalid {} entry '{}': {}", key, item, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_defaults() {
        let config = AggregatorConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.workers.daily_years.is_empty());
    }

    #[test]
    fn test_env_lists() {
        let config = AggregatorConfig::from_vars(vars(&[
            ("DAILY_YEARS", "2023, 2024"),
            ("TRACKED_STATIONS", "725030:14732,725300:94846,"),
            ("MAILBOX_MAX_IN_FLIGHT", "2"),
        ]))
        .unwrap();

        assert_eq!(config.workers.daily_years, vec![2023, 2024]);
        assert_eq!(config.workers.tracked_stations.len(), 2);
        assert_eq!(config.workers.mailbox.max_in_flight, 2);
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(AggregatorConfig::from_vars(vars(&[("DAILY_YEARS", "2024,next")])).is_err());
        assert!(AggregatorConfig::from_vars(vars(&[("DAILY_YEARS", "2024,2024")])).is_err());
        assert!(AggregatorConfig::from_vars(vars(&[("REQUEST_TIMEOUT_MS", "0")])).is_err());
    }

    #[test]
    fn test_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "http_port: 9000\nworkers:\n  daily_years: [2022]\n  tracked_stations: [S1]\n  mailbox:\n    capacity: 64"
        )
        .unwrap();

        let config = AggregatorConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.workers.daily_years, vec![2022]);
        assert_eq!(config.workers.mailbox.capacity, 64);
        assert_eq!(config.workers.mailbox.max_in_flight, 1);
        assert_eq!(config.store.keyspace, "isd_weather_data");
    }
}
