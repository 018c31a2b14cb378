//! Message-driven workers for weather ingestion and aggregation.
//!
//! # Architecture
//!
//! Every worker is a single mailbox task consuming a bounded channel. Callers
//! and timer ticks both enqueue messages; each message is handed to the same
//! compute routine, which runs as a spawned continuation and delivers its
//! result to the reply destination carried by the message. Workers hold no
//! durable state: the observation store is the single source of truth.
//!
//! - [`ingest`]: drains the ingestion queue into the store
//! - [`daily`], [`temperature`], [`precipitation`], [`station`]: read-only
//!   aggregation workers
//! - [`protocol`]: the caller-facing request/response protocol
//! - [`supervisor`]: spawns and stops the aggregation workers of one process

pub mod config;
pub mod daily;
pub mod ingest;
pub mod mailbox;
pub mod precipitation;
pub mod protocol;
pub mod station;
pub mod supervisor;
pub mod temperature;
pub mod ticker;

// Re-exports
pub use config::AggregationConfig;
pub use daily::{spawn_daily_worker, tick_schedule, DailyAggregator, DailyWorker};
pub use ingest::{IngestOutcome, IngestStats, IngestStatsSnapshot, IngestionWorker, RetryPolicy};
pub use mailbox::{spawn_worker, Compute, MailboxConfig, Message, Reply, ReplyTo, Worker, WorkerHandle};
pub use precipitation::{spawn_precipitation_worker, PrecipitationAggregator, PrecipitationWorker};
pub use protocol::{Dispatcher, WeatherRequest, WeatherResponse};
pub use station::{spawn_station_worker, StationDirectory, StationWorker};
pub use supervisor::WorkerSet;
pub use temperature::{spawn_temperature_worker, TemperatureAggregator, TemperatureWorker};
pub use ticker::Ticker;
