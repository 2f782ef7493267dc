use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::photo::ResponseError;
use crate::services::job_store::StoreError;
use crate::services::photo_service::IngestError;
use crate::services::storage::StorageError;

/// Failure of an HTTP handler, rendered as `{ "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Uploaded file is not a supported image")]
    UnsupportedMedia,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Store(e) | ApiError::Ingest(IngestError::Store(e)) => store_status(e),
            ApiError::Ingest(IngestError::Enqueue(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(StorageError::InvalidFilename(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::DuplicateId(_) => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ResponseError {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
