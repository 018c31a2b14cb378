//! Ingestion worker: drains the observation queue into the store.
//!
//! Per entry: parse, write with bounded retry, commit. Unparseable lines and
//! rejected writes are dropped (and committed) so one bad record never stops
//! the stream. A write that keeps failing transiently is left uncommitted
//! for redelivery and the worker moves on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use storage::{ObservationSource, ObservationStore, QueuedObservation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use weather_common::{WeatherError, WeatherRecord};

/// Backoff for transient store write failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total write attempts per record, including the first
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each retry)
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// What happened to one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored and committed
    Written,
    /// Unparseable or rejected; committed without a write
    Dropped,
    /// Retries exhausted; left pending
    Failed,
}

impl IngestOutcome {
    fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Written => "written",
            IngestOutcome::Dropped => "dropped",
            IngestOutcome::Failed => "failed",
        }
    }
}

/// Running counters shared with the status endpoint.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
    pub retries: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: IngestOutcome) {
        let slot = match outcome {
            IngestOutcome::Written => &self.written,
            IngestOutcome::Dropped => &self.dropped,
            IngestOutcome::Failed => &self.failed,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!("ingest_observations_total", "outcome" => outcome.label()).increment(1);
    }
}

pub struct IngestionWorker<S> {
    source: S,
    store: Arc<dyn ObservationStore>,
    retry: RetryPolicy,
    stats: Arc<IngestStats>,
}

impl<S: ObservationSource> IngestionWorker<S> {
    pub fn new(source: S, store: Arc<dyn ObservationStore>, retry: RetryPolicy) -> Self {
        Self {
            source,
            store,
            retry,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    /// Consume until the source closes or `shutdown` fires.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(max_attempts = self.retry.max_attempts, "Ingestion worker started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.source.next() => next,
            };

            match next {
                Ok(Some(entry)) => {
                    self.process(entry, &shutdown).await;
                }
                Ok(None) => {
                    info!("Observation source closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from observation source");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            written = stats.written,
            dropped = stats.dropped,
            failed = stats.failed,
            "Ingestion worker stopped"
        );
    }

    /// Handle one entry end to end, committing unless the write was exhausted.
    #[instrument(skip(self, entry, shutdown), fields(entry_id = %entry.entry_id))]
    pub async fn process(
        &mut self,
        entry: QueuedObservation,
        shutdown: &CancellationToken,
    ) -> IngestOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let outcome = match entry.raw.parse() {
            Ok(record) => {
                write_with_retry(self.store.as_ref(), &self.retry, &self.stats, &record, shutdown)
                    .await
            }
            Err(e) => {
                warn!(error = %e, line = %entry.raw.line(), "Dropping malformed observation");
                IngestOutcome::Dropped
            }
        };
        self.stats.record(outcome);

        if outcome != IngestOutcome::Failed {
            if let Err(e) = self.source.commit(&entry.entry_id).await {
                // The entry will be redelivered; the write is idempotent
                warn!(error = %e, "Failed to commit observation");
            }
        }

        outcome
    }
}

/// Write one record, retrying transient failures with backoff.
async fn write_with_retry(
    store: &dyn ObservationStore,
    retry: &RetryPolicy,
    stats: &IngestStats,
    record: &WeatherRecord,
    shutdown: &CancellationToken,
) -> IngestOutcome {
    let mut attempt = 1;
    loop {
        match store.write(record).await {
            Ok(()) => {
                debug!(station = %record.station_id, attempt = attempt, "Observation stored");
                return IngestOutcome::Written;
            }
            Err(WeatherError::StoreWriteRejected(reason)) => {
                error!(
                    alert = "store_write_rejected",
                    station = %record.station_id,
                    reason = %reason,
                    "Store rejected observation"
                );
                return IngestOutcome::Dropped;
            }
            Err(e) if attempt >= retry.max_attempts => {
                error!(
                    alert = "store_write_exhausted",
                    station = %record.station_id,
                    attempts = attempt,
                    error = %e,
                    "Giving up on observation write"
                );
                return IngestOutcome::Failed;
            }
            Err(e) => {
                let delay = retry.delay_for(attempt);
                warn!(
                    station = %record.station_id,
                    attempt = attempt,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store write failed, retrying"
                );
                stats.retries.fetch_add(1, Ordering::Relaxed);
                counter!("ingest_write_retries_total").increment(1);

                tokio::select! {
                    _ = shutdown.cancelled() => return IngestOutcome::Failed,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
