//! Typed read/write facade over the observation store.

use async_trait::async_trait;
use futures::stream::BoxStream;

use weather_common::{RecordFilter, WeatherRecord, WeatherResult, WeatherStation};

/// Read/write access to hourly observations and station metadata.
///
/// Every operation is independently retryable and nothing is cached.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Upsert one record by key. Fails with `StoreUnavailable` or
    /// `StoreWriteRejected`; a failed write is never partially applied.
    async fn write(&self, record: &WeatherRecord) -> WeatherResult<()>;

    /// Lazily stream the rows matching `filter` in key order.
    ///
    /// No matching rows is an empty stream, not an error. Connectivity loss
    /// surfaces as a `StoreUnavailable` item.
    fn query(&self, filter: RecordFilter) -> BoxStream<'_, WeatherResult<WeatherRecord>>;

    /// Zero-or-one station by id.
    async fn lookup(&self, station_id: &str) -> WeatherResult<Option<WeatherStation>>;
}

