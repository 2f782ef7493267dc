use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Identifier of a photo job. Also the exact payload carried on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh system-generated ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status of a photo job.
///
/// `Pending` is the only entry state. `Processed` and `Error` are terminal and
/// can only be reached through a [`JobOutcome`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Terminal result written back by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Processed { count: u32 },
    Error,
}

impl JobOutcome {
    pub fn status(self) -> JobStatus {
        match self {
            JobOutcome::Processed { .. } => JobStatus::Processed,
            JobOutcome::Error => JobStatus::Error,
        }
    }

    pub fn result_count(self) -> u32 {
        match self {
            JobOutcome::Processed { count } => count,
            JobOutcome::Error => 0,
        }
    }
}

/// A face-detection job for one uploaded photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub resource_path: String,
    pub status: JobStatus,
    pub result_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New pending job created now.
    pub fn new(id: JobId, resource_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            resource_path: resource_path.into(),
            status: JobStatus::Pending,
            result_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal outcome in place, keeping the immutable fields.
    pub fn apply(&mut self, outcome: JobOutcome) {
        self.status = outcome.status();
        self.result_count = outcome.result_count();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_new_job_is_pending_with_zero_count() {
        let job = Job::new(JobId::from("1001"), "/tmp/a.jpg");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.result_count, 0);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_status_strings_match_storage_format() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Processed.to_string(), "processed");
        assert_eq!(JobStatus::Error.to_string(), "error");
        assert_eq!(JobStatus::from_str("processed").unwrap(), JobStatus::Processed);
        assert!(JobStatus::from_str("completed").is_err());
    }

    #[test]
    fn test_outcomes_only_reach_terminal_states() {
        for outcome in [JobOutcome::Processed { count: 2 }, JobOutcome::Error] {
            assert!(outcome.status().is_terminal());
        }
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_error_outcome_always_has_zero_count() {
        let mut job = Job::new(JobId::from("7"), "/tmp/x.jpg");
        job.apply(JobOutcome::Processed { count: 4 });
        assert_eq!((job.status, job.result_count), (JobStatus::Processed, 4));

        job.apply(JobOutcome::Error);
        assert_eq!((job.status, job.result_count), (JobStatus::Error, 0));
        assert_eq!(job.resource_path, "/tmp/x.jpg");
    }

    #[test]
    fn test_job_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&JobId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
