use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::job::{Job, JobId};
use crate::models::photo::{ResultResponse, UploadResponse};
use crate::routes::error::ApiError;
use crate::services::photo_service::IngestError;

/// Multipart field carrying the image.
const PHOTO_FIELD: &str = "photo";

/// POST /upload: Upload a photo for face detection.
pub async fn upload_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        // Reject anything the image crate cannot identify
        image::guess_format(&data).map_err(|_| ApiError::UnsupportedMedia)?;

        upload = Some((filename, data.to_vec()));
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'photo' file field".to_string()))?;

    let path = state.storage.save(&filename, &data).await?;
    let resource_path = path.to_string_lossy().into_owned();

    let job = match state.photos.submit(&resource_path).await {
        Ok(job) => job,
        Err(e) => {
            // Without a job record nothing will ever reference the file.
            if matches!(e, IngestError::Store(_)) {
                if let Err(cleanup) = state.storage.delete(&path).await {
                    tracing::warn!(path = %resource_path, error = %cleanup, "Failed to remove orphaned upload");
                }
            }
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: job.id,
            status: job.status,
            message: "Photo uploaded successfully".to_string(),
        }),
    ))
}

/// GET /result/{id}: Check a job's status and face count.
pub async fn check_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let job = state.photos.get(&JobId::from(id)).await?;
    Ok(Json(ResultResponse::from(&job)))
}

/// GET /photo/{id}: Full job record.
pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.photos.get(&JobId::from(id)).await?;
    Ok(Json(job))
}
