//! Connection setup shared by the server and worker binaries.
//!
//! Failures here come back as [`StartupError`] to the binary's `main`, which
//! decides how to exit. Nothing in the library terminates the process.

use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

use crate::config::{AppConfig, ConfigError};
use crate::db;
use crate::services::queue::QueueError;
use crate::services::redis_queue::RedisQueue;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to connect to PostgreSQL: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to run database migrations: {0}")]
    Migrations(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to connect to Redis queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid analyzer command: {0:?}")]
    Analyzer(String),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Retry `connect` up to `attempts` times, doubling `backoff` after each failure.
pub async fn with_retry<T, E, F, Fut>(
    what: &str,
    attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    target_service = what,
                    attempt,
                    attempts,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Connect the PostgreSQL pool with the configured retry policy.
pub async fn connect_database(config: &AppConfig) -> Result<PgPool, StartupError> {
    tracing::info!("Connecting to PostgreSQL database");
    let pool = with_retry(
        "postgres",
        config.startup_retries,
        config.startup_backoff(),
        || db::init_pool(&config.database_url, config.store_timeout()),
    )
    .await?;
    Ok(pool)
}

/// Connect the Redis queue with the configured retry policy.
pub async fn connect_queue(config: &AppConfig) -> Result<RedisQueue, StartupError> {
    tracing::info!(queue = %config.queue_name, "Connecting to Redis job queue");
    let queue = with_retry(
        "redis",
        config.startup_retries,
        config.startup_backoff(),
        || RedisQueue::connect(&config.redis_url, &config.queue_name),
    )
    .await?;
    Ok(queue)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
