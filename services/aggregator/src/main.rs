//! Weather aggregation service.
//!
//! Spawns the Daily, Temperature, Precipitation and Station workers against
//! the observation store and serves the request protocol over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aggregator::{build_router, AggregatorConfig, AppState};
use storage::PgStore;
use workers::WorkerSet;

#[derive(Parser, Debug)]
#[command(name = "aggregator")]
#[command(about = "Weather aggregation workers and query API")]
struct Args {
    /// Configuration file path (environment variables are used when absent)
    #[arg(short, long, env = "AGGREGATOR_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize Prometheus metrics exporter
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Starting weather aggregation service");

    let config = match &args.config {
        Some(path) => AggregatorConfig::from_yaml(path)?,
        None => AggregatorConfig::from_env()?,
    };
    info!(
        keyspace = %config.store.keyspace,
        daily_years = ?config.workers.daily_years,
        "Loaded configuration"
    );

    let store = PgStore::connect(&config.store).await?;
    store.migrate().await?;

    let shutdown = CancellationToken::new();
    let workers = WorkerSet::spawn(
        Arc::new(store),
        &config.workers,
        Utc::now().date_naive(),
        &shutdown,
    )?;

    let state = Arc::new(AppState {
        dispatcher: workers.dispatcher(),
        request_timeout: config.request_timeout(),
        prometheus: Some(prometheus),
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port.unwrap_or(config.http_port)));
    info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            signal.cancel();
        })
        .await?;

    workers.stop().await;
    Ok(())
}
