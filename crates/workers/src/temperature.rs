//! Daily and monthly temperature extremes and averages.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures::TryStreamExt;
use storage::ObservationStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use weather_common::{
    Aggregate, ComputeRequest, Interval, Temperature, TemperatureFold, WeatherError,
    WeatherResult,
};

use crate::config::AggregationConfig;
use crate::mailbox::{Compute, Worker};

pub type TemperatureWorker = Worker<ComputeRequest, Aggregate<Temperature>>;

/// Fold the readings of one station over a day or month into high, low and
/// mean, in key order.
#[instrument(skip(store), fields(station = %request.station_id, request_id = %request.request_id))]
pub async fn fold_temperature(
    store: &dyn ObservationStore,
    request: &ComputeRequest,
) -> WeatherResult<Aggregate<Temperature>> {
    if let Interval::Year { .. } = request.interval {
        return Err(WeatherError::InvalidRequest(
            "temperature is computed per day or month".to_string(),
        ));
    }

    let filter = request.interval.filter(&request.station_id)?;
    let mut rows = store.query(filter);
    let mut fold = TemperatureFold::default();
    while let Some(record) = rows.try_next().await? {
        fold.push(record.temperature);
    }

    debug!(readings = fold.count(), "Temperature folded");
    Ok(fold.finish(&request.station_id, request.interval).into())
}

pub struct TemperatureAggregator {
    store: Arc<dyn ObservationStore>,
}

impl TemperatureAggregator {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Compute for TemperatureAggregator {
    type Request = ComputeRequest;
    type Output = Aggregate<Temperature>;

    fn role(&self) -> &'static str {
        "temperature"
    }

    async fn compute(&self, request: &ComputeRequest) -> WeatherResult<Aggregate<Temperature>> {
        fold_temperature(self.store.as_ref(), request).await
    }
}

/// Start the temperature worker with its rolling current-month summary tick.
///
/// The tick runs every `summary_period` for the worker's lifetime and
/// issues one request per tracked station; with none tracked it fires
/// without work.
pub fn spawn_temperature_worker(
    store: Arc<dyn ObservationStore>,
    config: &AggregationConfig,
    shutdown: &CancellationToken,
) -> TemperatureWorker {
    let worker = Worker::spawn(TemperatureAggregator::new(store), &config.mailbox, shutdown);

    let stations = config.tracked_stations.clone();
    worker
        .ticker()
        .schedule_every(config.summary_period(), worker.handle(), move || {
            let today = Utc::now().date_naive();
            stations
                .iter()
                .map(|station| ComputeRequest::monthly(station, today.year(), today.month()))
                .collect()
        });

    worker
}
