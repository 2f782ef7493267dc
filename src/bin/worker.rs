use metrics_exporter_prometheus::PrometheusBuilder;
use photo_pipeline::{
    config::AppConfig,
    db::queries::PgJobStore,
    services::{
        analysis::CommandAnalyzer,
        queue::QueueChannel,
        worker::{self, Worker, WorkerConfig},
    },
    startup::{self, StartupError},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting photo analysis worker");

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Worker failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;

    let analyzer =
        CommandAnalyzer::from_command_line(&config.analyzer_command, config.analysis_timeout())
            .ok_or_else(|| StartupError::Analyzer(config.analyzer_command.clone()))?;

    // Worker series are scraped from its own listener, not the server's /metrics
    let metrics_addr = config
        .worker_metrics_socket()
        .map_err(|e| StartupError::Metrics(format!("{}: {}", config.worker_metrics_addr, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;
    worker::describe_metrics();
    tracing::info!(addr = %metrics_addr, "Serving worker metrics");

    let db_pool = startup::connect_database(&config).await?;
    let queue: Arc<dyn QueueChannel> = Arc::new(startup::connect_queue(&config).await?);
    let store = Arc::new(PgJobStore::new(db_pool.clone()));

    let worker = Worker::new(
        store,
        queue,
        Arc::new(analyzer),
        WorkerConfig::from_app_config(&config),
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        startup::shutdown_signal().await;
        signal_token.cancel();
    });

    // The pool is closed on both the success and the error path.
    let result = worker.run(shutdown).await;
    db_pool.close().await;

    let handled = result?;
    tracing::info!(handled, "Worker exited cleanly");
    Ok(())
}
