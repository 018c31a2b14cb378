//! Station metadata lookups.

use std::sync::Arc;

use async_trait::async_trait;
use storage::ObservationStore;
use tokio_util::sync::CancellationToken;

use weather_common::{StationLookup, StationRequest, WeatherError, WeatherResult};

use crate::config::AggregationConfig;
use crate::mailbox::{Compute, Worker};

pub type StationWorker = Worker<StationRequest, StationLookup>;

/// Answers station id lookups. An absent id is `NotFound`; more than one
/// metadata row for an id is surfaced by the store as an error.
pub struct StationDirectory {
    store: Arc<dyn ObservationStore>,
}

impl StationDirectory {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Compute for StationDirectory {
    type Request = StationRequest;
    type Output = StationLookup;

    fn role(&self) -> &'static str {
        "station"
    }

    async fn compute(&self, request: &StationRequest) -> WeatherResult<StationLookup> {
        if request.station_id.trim().is_empty() {
            return Err(WeatherError::InvalidRequest("empty station id".to_string()));
        }
        Ok(self.store.lookup(&request.station_id).await?.into())
    }
}

pub fn spawn_station_worker(
    store: Arc<dyn ObservationStore>,
    config: &AggregationConfig,
    shutdown: &CancellationToken,
) -> StationWorker {
    Worker::spawn(StationDirectory::new(store), &config.mailbox, shutdown)
}
