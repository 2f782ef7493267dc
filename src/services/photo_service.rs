use std::sync::Arc;
use std::time::Duration;

use crate::models::job::{Job, JobId};
use crate::services::bounded;
use crate::services::job_store::{JobStore, StoreError};
use crate::services::producer::{EnqueueError, Producer};

/// Ingestion and query paths in front of the job store and producer.
#[derive(Clone)]
pub struct PhotoService {
    store: Arc<dyn JobStore>,
    producer: Producer,
    timeout: Duration,
}

impl PhotoService {
    pub fn new(store: Arc<dyn JobStore>, producer: Producer, timeout: Duration) -> Self {
        Self {
            store,
            producer,
            timeout,
        }
    }

    /// Record a pending job for `resource_path` under a fresh ID and queue it.
    pub async fn submit(&self, resource_path: &str) -> Result<Job, IngestError> {
        self.submit_with_id(JobId::generate(), resource_path).await
    }

    /// Same as [`PhotoService::submit`] with a caller-chosen ID.
    ///
    /// The create is durable before the enqueue starts. If the enqueue fails
    /// the job stays `pending` in the store.
    pub async fn submit_with_id(&self, id: JobId, resource_path: &str) -> Result<Job, IngestError> {
        let job = Job::new(id, resource_path);

        bounded(self.timeout, self.store.create(&job), || {
            StoreError::Unavailable("create timed out".to_string())
        })
        .await?;

        if let Err(e) = self.producer.enqueue(&job.id).await {
            tracing::error!(job_id = %job.id, error = %e, "Job created but not enqueued, it stays pending");
            return Err(e.into());
        }

        metrics::counter!("photo_jobs_submitted_total").increment(1);
        tracing::info!(job_id = %job.id, resource_path = %job.resource_path, "Photo job submitted");
        Ok(job)
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        bounded(self.timeout, self.store.get(id), || {
            StoreError::Unavailable("get timed out".to_string())
        })
        .await
    }

    pub async fn store_health(&self) -> Result<(), StoreError> {
        bounded(self.timeout, self.store.health_check(), || {
            StoreError::Unavailable("health check timed out".to_string())
        })
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}
