use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_pipeline::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries::PgJobStore},
    routes::{self, metrics::MetricsState},
    services::{
        photo_service::PhotoService, producer::Producer, queue::QueueChannel,
        storage::LocalPhotoStorage,
    },
    startup::{self, StartupError},
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Server failed to start");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;

    tracing::info!("Initializing photo-pipeline server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("photo_jobs_submitted_total", "Photo jobs created and enqueued");
    metrics::describe_gauge!("photo_queue_depth", "Job IDs waiting in the queue");

    let db_pool = startup::connect_database(&config).await?;

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool).await?;

    let queue: Arc<dyn QueueChannel> = Arc::new(startup::connect_queue(&config).await?);

    let store = Arc::new(PgJobStore::new(db_pool.clone()));
    let producer = Producer::new(queue.clone(), config.store_timeout());
    let photos = PhotoService::new(store, producer, config.store_timeout());
    let storage = LocalPhotoStorage::new(&config.photo_storage_path);

    tracing::info!(path = %config.photo_storage_path, "Photos will be stored locally");

    let state = AppState::new(photos, storage, queue.clone());
    let metrics_state = MetricsState {
        handle: prometheus_handle,
        queue,
    };

    let app = routes::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(startup::shutdown_signal())
        .await?;

    // Connections close when the pool and queue drop; close the pool explicitly
    // so in-flight queries finish first.
    db_pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}
