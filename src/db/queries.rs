use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::job::{Job, JobId, JobOutcome, JobStatus};
use crate::services::job_store::{JobStore, StoreError};

/// PostgreSQL-backed job store over the `photo_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    /// Insert a new job; an existing ID is reported as a duplicate.
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO photo_jobs (id, resource_path, status, result_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.resource_path)
        .bind(job.status.to_string())
        .bind(i64::from(job.result_count))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId(job.id.clone()));
        }
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, resource_path, status, result_count, created_at, updated_at
            FROM photo_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => job_from_row(id, &r),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    /// Update job status and result count
    async fn update_status(&self, id: &JobId, outcome: JobOutcome) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE photo_jobs
            SET status = $1,
                result_count = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(outcome.status().to_string())
        .bind(i64::from(outcome.result_count()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn job_from_row(id: &JobId, r: &PgRow) -> Result<Job, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };

    let status_str: String = r.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| corrupt(format!("unknown status {:?}", status_str)))?;

    let count: i64 = r.try_get("result_count")?;
    let result_count =
        u32::try_from(count).map_err(|_| corrupt(format!("result_count {} out of range", count)))?;

    Ok(Job {
        id: JobId::new(r.try_get::<String, _>("id")?),
        resource_path: r.try_get("resource_path")?,
        status,
        result_count,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}
