use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod error;
pub mod health;
pub mod metrics;
pub mod photo;

/// Upload, query and health routes. The caller adds `/metrics` and layers.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Photo pipeline API is up and running" }))
        .route("/health", get(health::health_check))
        .route("/upload", post(photo::upload_photo))
        .route("/result/{id}", get(photo::check_result))
        .route("/photo/{id}", get(photo::get_photo))
        .with_state(state)
}
