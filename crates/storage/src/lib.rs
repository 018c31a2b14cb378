//! Storage abstractions for the weather aggregation services.
//!
//! Provides unified interfaces for:
//! - The observation store (PostgreSQL, or in-process for tests)
//! - The ingestion queue (Redis Streams, or an in-process channel)

pub mod memory;
pub mod postgres;
pub mod queue;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::{PgStore, StoreConfig};
pub use queue::{CommitLog, FeedSender, MemoryQueue, ObservationQueue, ObservationSource, QueuedObservation};
pub use store::ObservationStore;
