use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::job::{Job, JobId, JobOutcome};

/// Durable persistence of photo jobs, keyed by job ID.
///
/// Implementations never retry internally. Transient failures come back as
/// [`StoreError::Unavailable`] and the caller decides what to do.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. Must be durable before returning `Ok`.
    /// An existing record with the same ID is left untouched.
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: &JobId) -> Result<Job, StoreError>;

    /// Overwrite status and result count of an existing job.
    async fn update_status(&self, id: &JobId, outcome: JobOutcome) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    DuplicateId(JobId),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored job {id} is malformed: {reason}")]
    Corrupt { id: JobId, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// In-process job store backed by a concurrent map.
///
/// Not durable across restarts; used by tests and local runs. Every key has
/// atomic create and update through the map's entry API.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<JobId, Job>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.check_available()?;
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(job.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        self.check_available()?;
        self.jobs
            .get(id)
            .map(|job| job.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_status(&self, id: &JobId, outcome: JobOutcome) -> Result<(), StoreError> {
        self.check_available()?;
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        job.apply(outcome);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
