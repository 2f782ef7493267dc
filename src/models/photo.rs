use serde::{Deserialize, Serialize};

use crate::models::job::{Job, JobId, JobStatus};

/// Response after uploading a photo.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// Response for querying a job's result.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub result_count: u32,
}

impl From<&Job> for ResultResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            result_count: job.result_count,
        }
    }
}

/// Error body returned by every failing handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
}
