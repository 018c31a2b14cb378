//! Observation ingester service.
//!
//! Consumes raw feed lines from the Redis ingestion stream and writes them
//! to the PostgreSQL observation store, exposing progress over HTTP.

pub mod config;
pub mod server;

pub use config::IngesterConfig;
pub use server::{build_router, ServerState};
