//! Aggregation worker settings shared by the services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use weather_common::{WeatherError, WeatherResult};

use crate::mailbox::MailboxConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub mailbox: MailboxConfig,
    /// Reporting years that get a dedicated Daily worker
    pub daily_years: Vec<i32>,
    /// Spacing between consecutive daily pre-warm ticks
    pub daily_tick_interval_ms: u64,
    /// Period of the temperature worker's rolling summary tick
    pub summary_period_secs: u64,
    /// Stations the background ticks recompute
    pub tracked_stations: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            mailbox: MailboxConfig::default(),
            daily_years: Vec::new(),
            daily_tick_interval_ms: 1000,
            summary_period_secs: 3600,
            tracked_stations: Vec::new(),
        }
    }
}

impl AggregationConfig {
    pub fn daily_tick_interval(&self) -> Duration {
        Duration::from_millis(self.daily_tick_interval_ms)
    }

    pub fn summary_period(&self) -> Duration {
        Duration::from_secs(self.summary_period_secs)
    }

    pub fn validate(&self) -> WeatherResult<()> {
        if self.mailbox.capacity == 0 {
            return Err(WeatherError::ConfigError(
                "mailbox capacity must be at least 1".to_string(),
            ));
        }
        if self.mailbox.max_in_flight == 0 {
            return Err(WeatherError::ConfigError(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.daily_tick_interval_ms == 0 || self.summary_period_secs == 0 {
            return Err(WeatherError::ConfigError(
                "tick intervals must be positive".to_string(),
            ));
        }
        if self.tracked_stations.iter().any(|s| s.trim().is_empty()) {
            return Err(WeatherError::ConfigError(
                "tracked station ids must not be empty".to_string(),
            ));
        }

        let mut years = self.daily_years.clone();
        years.sort_unstable();
        years.dedup();
        if years.len() != self.daily_years.len() {
            return Err(WeatherError::ConfigError(
                "daily_years contains duplicates".to_string(),
            ));
        }

        Ok(())
    }
}
