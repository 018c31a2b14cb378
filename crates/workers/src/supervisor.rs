//! Lifecycle of the aggregation workers hosted by one process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use storage::ObservationStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use weather_common::WeatherResult;

use crate::config::AggregationConfig;
use crate::daily::{spawn_daily_worker, DailyWorker};
use crate::precipitation::{spawn_precipitation_worker, PrecipitationWorker};
use crate::protocol::Dispatcher;
use crate::station::{spawn_station_worker, StationWorker};
use crate::temperature::{spawn_temperature_worker, TemperatureWorker};

pub struct WorkerSet {
    temperature: TemperatureWorker,
    daily: Vec<(i32, DailyWorker)>,
    precipitation: PrecipitationWorker,
    station: StationWorker,
}

impl WorkerSet {
    /// Spawn one Temperature, Precipitation and Station worker plus a Daily
    /// worker per configured year. `today` bounds the daily pre-warm ticks.
    pub fn spawn(
        store: Arc<dyn ObservationStore>,
        config: &AggregationConfig,
        today: NaiveDate,
        shutdown: &CancellationToken,
    ) -> WeatherResult<Self> {
        config.validate()?;

        let temperature = spawn_temperature_worker(store.clone(), config, shutdown);
        let precipitation = spawn_precipitation_worker(store.clone(), config, shutdown);
        let station = spawn_station_worker(store.clone(), config, shutdown);
        let daily = config
            .daily_years
            .iter()
            .map(|&year| {
                (
                    year,
                    spawn_daily_worker(store.clone(), year, today, config, shutdown),
                )
            })
            .collect::<Vec<_>>();

        info!(
            daily_years = ?config.daily_years,
            tracked_stations = config.tracked_stations.len(),
            "Aggregation workers started"
        );

        Ok(Self {
            temperature,
            daily,
            precipitation,
            station,
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let daily = self
            .daily
            .iter()
            .map(|(year, worker)| (*year, worker.handle()))
            .collect::<HashMap<_, _>>();

        Dispatcher::new(
            self.temperature.handle(),
            daily,
            self.precipitation.handle(),
            self.station.handle(),
        )
    }

    /// Cancel every ticker and stop every mailbox.
    pub async fn stop(self) {
        join_all(self.daily.into_iter().map(|(_, worker)| worker.stop())).await;
        self.temperature.stop().await;
        self.precipitation.stop().await;
        self.station.stop().await;
        info!("Aggregation workers stopped");
    }
}
