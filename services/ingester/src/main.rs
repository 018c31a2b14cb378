//! Observation ingester service.
//!
//! `run` drains the Redis ingestion stream into the observation store;
//! `publish` pushes a feed file onto the stream in batches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ingester::server::{self, ServerState};
use ingester::IngesterConfig;
use storage::{ObservationQueue, PgStore};
use workers::IngestionWorker;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Weather observation ingester")]
struct Args {
    /// Configuration file path (environment variables are used when absent)
    #[arg(short, long, env = "INGESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume the ingestion stream (default)
    Run {
        /// Disable the status server
        #[arg(long)]
        no_status_server: bool,
    },
    /// Publish the lines of a feed file to the ingestion stream
    Publish {
        /// Feed file, one observation per line
        file: PathBuf,

        /// Lines per batch (overrides configuration)
        #[arg(long)]
        batch_size: Option<usize>,
    },
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

    // Load configuration
    let config = match &args.config {
        Some(path) => IngesterConfig::from_yaml(path)?,
        None => IngesterConfig::from_env()?,
    };
    info!(
        keyspace = %config.store.keyspace,
        consumer = %config.consumer_name,
        "Loaded configuration"
    );

    match args.command.unwrap_or(Command::Run {
        no_status_server: false,
    }) {
        Command::Run { no_status_server } => run(config, no_status_server).await,
        Command::Publish { file, batch_size } => {
            let batch_size = batch_size.unwrap_or(config.publish_batch_size).max(1);
            publish(&config, &file, batch_size).await
        }
    }
}

async fn run(config: IngesterConfig, no_status_server: bool) -> Result<()> {
    info!("Starting weather observation ingester");

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let store = PgStore::connect(&config.store).await?;
    store.migrate().await?;
    let queue = ObservationQueue::connect(&config.redis_url, config.consumer_name.clone())
        .await?
        .with_reclaim_interval(config.reclaim_interval());

    let mut worker = IngestionWorker::new(queue, Arc::new(store), config.retry.clone());

    if !no_status_server {
        let state = Arc::new(ServerState::new(worker.stats(), Some(prometheus)));
        let port = config.status_port;
        tokio::spawn(async move {
            if let Err(e) = server::start_server(state, port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    // Handle Ctrl+C
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal.cancel();
    });

    worker.run(shutdown).await;
    Ok(())
}

async fn publish(config: &IngesterConfig, file: &Path, batch_size: usize) -> Result<()> {
    let mut queue = ObservationQueue::connect(&config.redis_url, config.consumer_name.clone()).await?;

    let handle = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open feed file {}", file.display()))?;
    let mut lines = BufReader::new(handle).lines();

    let mut batch = Vec::with_capacity(batch_size);
    let mut published = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        batch.push(line);
        if batch.len() == batch_size {
            published += queue.publish_batch(&batch).await?;
            batch.clear();
        }
    }
    published += queue.publish_batch(&batch).await?;

    info!(file = %file.display(), published = published, "Feed published");
    Ok(())
}
