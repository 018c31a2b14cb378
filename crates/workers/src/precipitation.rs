//! Cumulative annual precipitation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use storage::ObservationStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use weather_common::{
    Aggregate, ComputeRequest, Interval, Precipitation, PrecipitationFold, WeatherError,
    WeatherResult,
};

use crate::config::AggregationConfig;
use crate::mailbox::{Compute, Worker};

pub type PrecipitationWorker = Worker<ComputeRequest, Aggregate<Precipitation>>;

pub struct PrecipitationAggregator {
    store: Arc<dyn ObservationStore>,
}

impl PrecipitationAggregator {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Compute for PrecipitationAggregator {
    type Request = ComputeRequest;
    type Output = Aggregate<Precipitation>;

    fn role(&self) -> &'static str {
        "precipitation"
    }

    #[instrument(skip(self), fields(station = %request.station_id, request_id = %request.request_id))]
    async fn compute(&self, request: &ComputeRequest) -> WeatherResult<Aggregate<Precipitation>> {
        let Interval::Year { year } = request.interval else {
            return Err(WeatherError::InvalidRequest(
                "precipitation is computed per year".to_string(),
            ));
        };

        let filter = request.interval.filter(&request.station_id)?;
        let mut rows = self.store.query(filter);
        let mut fold = PrecipitationFold::default();
        while let Some(record) = rows.try_next().await? {
            fold.push(&record);
        }

        let result = fold.finish(&request.station_id, year);
        debug!(found = result.is_some(), "Precipitation folded");
        Ok(result.into())
    }
}

pub fn spawn_precipitation_worker(
    store: Arc<dyn ObservationStore>,
    config: &AggregationConfig,
    shutdown: &CancellationToken,
) -> PrecipitationWorker {
    Worker::spawn(PrecipitationAggregator::new(store), &config.mailbox, shutdown)
}
