//! Per-year daily temperature worker.
//!
//! Each instance owns one reporting year. At start it schedules one
//! pre-warm tick per elapsed day and tracked station, spaced out by the
//! configured interval so the store never sees the whole year at once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use storage::ObservationStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use weather_common::{
    elapsed_days, Aggregate, ComputeRequest, Interval, Temperature, WeatherError, WeatherResult,
};

use crate::config::AggregationConfig;
use crate::mailbox::{Compute, Worker};
use crate::temperature::fold_temperature;

pub type DailyWorker = Worker<ComputeRequest, Aggregate<Temperature>>;

pub struct DailyAggregator {
    store: Arc<dyn ObservationStore>,
    year: i32,
}

impl DailyAggregator {
    pub fn new(store: Arc<dyn ObservationStore>, year: i32) -> Self {
        Self { store, year }
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

#[async_trait]
impl Compute for DailyAggregator {
    type Request = ComputeRequest;
    type Output = Aggregate<Temperature>;

    fn role(&self) -> &'static str {
        "daily"
    }

    async fn compute(&self, request: &ComputeRequest) -> WeatherResult<Aggregate<Temperature>> {
        match request.interval {
            Interval::Day { year, .. } if year == self.year => {
                fold_temperature(self.store.as_ref(), request).await
            }
            Interval::Day { year, .. } => Err(WeatherError::InvalidRequest(format!(
                "daily worker for {} cannot answer {}",
                self.year, year
            ))),
            _ => Err(WeatherError::InvalidRequest(
                "daily worker only answers single days".to_string(),
            )),
        }
    }
}

/// Pre-warm requests for every elapsed day of `year`, day by day, each day
/// covering every station.
pub fn tick_schedule(year: i32, today: NaiveDate, stations: &[String]) -> Vec<ComputeRequest> {
    (1..=elapsed_days(year, today))
        .flat_map(|day| {
            stations
                .iter()
                .map(move |station| ComputeRequest::daily(station, year, day))
        })
        .collect()
}

/// Start the Daily worker for `year` and queue its pre-warm ticks.
pub fn spawn_daily_worker(
    store: Arc<dyn ObservationStore>,
    year: i32,
    today: NaiveDate,
    config: &AggregationConfig,
    shutdown: &CancellationToken,
) -> DailyWorker {
    let worker = Worker::spawn(DailyAggregator::new(store, year), &config.mailbox, shutdown);

    let schedule = tick_schedule(year, today, &config.tracked_stations);
    if !schedule.is_empty() {
        info!(year = year, ticks = schedule.len(), "Scheduling daily pre-warm ticks");
        worker
            .ticker()
            .schedule_sequence(config.daily_tick_interval(), worker.handle(), schedule);
    }

    worker
}
