//! In-process observation store.
//!
//! Holds records in key order behind a `tokio::sync::RwLock`, with the same
//! contract as [`PgStore`](crate::PgStore): upsert by key, key-ordered
//! lazy queries, zero-or-one station lookups. Fault hooks let tests
//! simulate an unavailable store, transient write failures and slow queries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;

use weather_common::{
    RecordFilter, RecordKey, WeatherError, WeatherRecord, WeatherResult, WeatherStation,
};

use crate::store::ObservationStore;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, WeatherRecord>>,
    stations: RwLock<HashMap<String, WeatherStation>>,
    unavailable: AtomicBool,
    /// Remaining writes to fail with `StoreUnavailable`
    failing_writes: AtomicU32,
    /// Artificial latency per query, in milliseconds
    query_delay_ms: AtomicU64,
    writes: AtomicU64,
    queries: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace reference station metadata.
    pub async fn insert_station(&self, station: WeatherStation) {
        self.stations
            .write()
            .await
            .insert(station.id.clone(), station);
    }

    /// Make every operation fail with `StoreUnavailable` until reset.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Fail the next `count` writes with `StoreUnavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful writes, including overwrites.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of queries issued, including failed ones.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of distinct stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, key: &RecordKey) -> Option<WeatherRecord> {
        self.records.read().await.get(key).cloned()
    }

    fn check_available(&self) -> WeatherResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WeatherError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn write(&self, record: &WeatherRecord) -> WeatherResult<()> {
        self.check_available()?;
        if self.take_write_failure() {
            return Err(WeatherError::StoreUnavailable(
                "simulated write failure".to_string(),
            ));
        }
        record.validate_key()?;

        self.records.write().await.insert(record.key(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn query(&self, filter: RecordFilter) -> BoxStream<'_, WeatherResult<WeatherRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let rows = async move {
            let delay = self.query_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if let Err(e) = self.check_available() {
                return vec![Err(e)];
            }

            let records = self.records.read().await;
            records
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .map(Ok)
                .collect::<Vec<_>>()
        };

        stream::once(rows).flat_map(stream::iter).boxed()
    }

    async fn lookup(&self, station_id: &str) -> WeatherResult<Option<WeatherStation>> {
        self.check_available()?;
        Ok(self.stations.read().await.get(station_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use weather_common::Interval;

    fn record(station: &str, day: u32, hour: u32, temperature: f64) -> WeatherRecord {
        WeatherRecord {
            station_id: station.to_string(),
            year: 2024,
            month: 3,
            day,
            hour,
            temperature,
            dewpoint: 0.0,
            pressure: 1013.0,
            wind_direction: 180,
            wind_speed: 3.0,
            sky_condition: 1,
            one_hour_precip: 0.0,
            six_hour_precip: 0.0,
        }
    }

    fn march(station: &str) -> RecordFilter {
        Interval::Month {
            year: 2024,
            month: 3,
        }
        .filter(station)
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_query_returns_identical_record() {
        let store = MemoryStore::new();
        let written = record("S1", 1, 0, 10.0);
        store.write(&written).await.unwrap();

        let rows: Vec<_> = store.query(march("S1")).try_collect().await.unwrap();
        assert_eq!(rows, vec![written]);
    }

    #[tokio::test]
    async fn test_query_is_key_ordered_and_filtered() {
        let store = MemoryStore::new();
        store.write(&record("S1", 2, 0, 3.0)).await.unwrap();
        store.write(&record("S1", 1, 5, 2.0)).await.unwrap();
        store.write(&record("S1", 1, 0, 1.0)).await.unwrap();
        store.write(&record("S2", 1, 0, 9.0)).await.unwrap();

        let rows: Vec<_> = store.query(march("S1")).try_collect().await.unwrap();
        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = MemoryStore::new();
        let rows: Vec<_> = store.query(march("S1")).try_collect().await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_same_key_is_last_write_wins() {
        let store = MemoryStore::new();
        store.write(&record("S1", 1, 0, 10.0)).await.unwrap();
        store.write(&record("S1", 1, 0, 11.0)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.write_count(), 2);
        let stored = store.get(&record("S1", 1, 0, 0.0).key()).await.unwrap();
        assert_eq!(stored.temperature, 11.0);
    }

    #[tokio::test]
    async fn test_malformed_key_is_rejected() {
        let store = MemoryStore::new();
        let mut bad = record("S1", 1, 0, 10.0);
        bad.month = 13;

        assert!(matches!(
            store.write(&bad).await,
            Err(WeatherError::StoreWriteRejected(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(
            store.write(&record("S1", 1, 0, 1.0)).await,
            Err(WeatherError::StoreUnavailable(_))
        ));
        let result: WeatherResult<Vec<_>> = store.query(march("S1")).try_collect().await;
        assert!(matches!(result, Err(WeatherError::StoreUnavailable(_))));
        assert!(store.lookup("S1").await.is_err());

        store.set_available(true);
        assert!(store.write(&record("S1", 1, 0, 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_transient_write_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);

        assert!(store.write(&record("S1", 1, 0, 1.0)).await.is_err());
        assert!(store.write(&record("S1", 1, 0, 1.0)).await.is_err());
        assert!(store.write(&record("S1", 1, 0, 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_station_lookup() {
        let store = MemoryStore::new();
        store
            .insert_station(WeatherStation::new(
                "725030:14732",
                "NEW YORK/LA GUARDIA",
                "US",
                "KLGA",
                40.779,
                -73.88,
                9.4,
            ))
            .await;

        let station = store.lookup("725030:14732").await.unwrap().unwrap();
        assert_eq!(station.call_sign, "KLGA");
        assert!(store.lookup("000000:00000").await.unwrap().is_none());
    }
}
