//! Aggregation service: hosts the aggregation workers and exposes the
//! weather request protocol over HTTP.

pub mod config;
pub mod server;

pub use config::AggregatorConfig;
pub use server::{build_router, AppState};
