use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::models::job::{JobId, JobOutcome};
use crate::services::analysis::Analyzer;
use crate::services::bounded;
use crate::services::job_store::{JobStore, StoreError};
use crate::services::queue::{self, Delivery, QueueChannel, QueueError};

/// Tuning knobs for the consumer loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deliveries processed at the same time. At least 1.
    pub concurrency: usize,
    /// Bound on each store and queue call.
    pub store_timeout: Duration,
    /// How long a single receive blocks before the loop re-checks shutdown.
    pub receive_wait: Duration,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.worker_concurrency,
            store_timeout: config.store_timeout(),
            receive_wait: config.receive_wait(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            store_timeout: Duration::from_secs(5),
            receive_wait: Duration::from_secs(5),
        }
    }
}

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Analysis succeeded and the count was stored.
    Processed(u32),
    /// Analysis failed and the job was marked `error`.
    Failed,
    /// No job exists for the delivered ID. The message is dropped.
    Orphaned,
    /// The job could not be loaded. It stays `pending` and the message is left
    /// unacknowledged, so the next start redelivers it.
    StoreUnavailable,
    /// Analysis ran but its result could not be written. The job stays `pending`.
    StatusWriteFailed,
    /// The payload is not a usable job ID.
    InvalidPayload,
}

/// Consumer side of the photo pipeline.
///
/// Pulls job IDs from the queue, runs the analyzer on each job's photo, and
/// writes the terminal status back. A failure on one message never stops the
/// loop. Messages are acknowledged after the status write is attempted, so a
/// failed write leaves the job `pending` with nothing left in the queue; that
/// gap needs an external sweep of stale pending jobs. A job that cannot be
/// loaded at all keeps its message in the processing list instead.
///
/// Redelivery of a job that is already terminal re-runs analysis and
/// overwrites the stored result.
pub struct Worker {
    store: Arc<dyn JobStore>,
    channel: Arc<dyn QueueChannel>,
    analyzer: Arc<dyn Analyzer>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        channel: Arc<dyn QueueChannel>,
        analyzer: Arc<dyn Analyzer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            channel,
            analyzer,
            config,
        }
    }

    /// Run until `shutdown` is cancelled, then let in-flight deliveries finish.
    ///
    /// Messages a previous run left unacknowledged are put back on the queue
    /// first. Returns the number of deliveries handled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<u64, QueueError> {
        let requeued = bounded(self.config.store_timeout, self.channel.requeue_unacked(), || {
            QueueError::Receive("requeue of unacknowledged messages timed out".to_string())
        })
        .await?;
        if requeued > 0 {
            tracing::warn!(requeued, "Requeued messages left unacknowledged by a previous run");
        }

        tracing::info!(
            concurrency = self.config.concurrency,
            "Worker ready, waiting for jobs"
        );

        let handled = AtomicU64::new(0);
        queue::subscribe(self.channel.clone(), self.config.receive_wait, shutdown)
            .for_each_concurrent(self.config.concurrency.max(1), |item| {
                let handled = &handled;
                async move {
                    match item {
                        Ok(delivery) => {
                            self.handle(delivery).await;
                            handled.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to receive from queue, will retry");
                        }
                    }
                }
            })
            .await;

        let handled = handled.load(Ordering::Relaxed);
        tracing::info!(handled, "Worker stopped");
        Ok(handled)
    }

    /// Process one delivery and acknowledge it.
    pub async fn handle(&self, delivery: Delivery) -> ProcessOutcome {
        let outcome = self.process(&delivery.payload).await;
        record_outcome(outcome);

        if outcome == ProcessOutcome::StoreUnavailable {
            tracing::warn!(
                payload = %delivery.payload,
                "Leaving message unacknowledged for redelivery on restart"
            );
            return outcome;
        }

        let acked = bounded(self.config.store_timeout, self.channel.ack(&delivery), || {
            QueueError::Ack("acknowledge timed out".to_string())
        })
        .await;
        if let Err(e) = acked {
            tracing::error!(payload = %delivery.payload, error = %e, "Failed to acknowledge message");
        }

        outcome
    }

    async fn process(&self, payload: &str) -> ProcessOutcome {
        let payload = payload.trim();
        if payload.is_empty() {
            tracing::warn!("Discarding message with empty payload");
            return ProcessOutcome::InvalidPayload;
        }
        let job_id = JobId::from(payload);

        let loaded = bounded(self.config.store_timeout, self.store.get(&job_id), || {
            StoreError::Unavailable("get timed out".to_string())
        })
        .await;
        let job = match loaded {
            Ok(job) => job,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(job_id = %job_id, "No job found for message, discarding");
                return ProcessOutcome::Orphaned;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job, leaving it pending");
                return ProcessOutcome::StoreUnavailable;
            }
        };

        if job.status.is_terminal() {
            tracing::info!(
                job_id = %job_id,
                status = %job.status,
                "Redelivered job already finished, re-running analysis"
            );
        }

        tracing::info!(job_id = %job_id, resource_path = %job.resource_path, "Processing photo");

        let start = Instant::now();
        let analyzed = self.analyzer.analyze(&job.resource_path).await;
        metrics::histogram!("photo_analysis_seconds").record(start.elapsed().as_secs_f64());

        let outcome = match analyzed {
            Ok(count) => {
                tracing::info!(
                    job_id = %job_id,
                    faces_detected = count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Analysis complete"
                );
                JobOutcome::Processed { count }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Analysis failed, marking job as error");
                JobOutcome::Error
            }
        };

        let written = bounded(
            self.config.store_timeout,
            self.store.update_status(&job_id, outcome),
            || StoreError::Unavailable("update_status timed out".to_string()),
        )
        .await;
        if let Err(e) = written {
            tracing::error!(
                job_id = %job_id,
                status = %outcome.status(),
                error = %e,
                "Failed to write job status, job stays pending"
            );
            return ProcessOutcome::StatusWriteFailed;
        }

        match outcome {
            JobOutcome::Processed { count } => ProcessOutcome::Processed(count),
            JobOutcome::Error => ProcessOutcome::Failed,
        }
    }
}

/// Register descriptions for the series the worker records.
pub fn describe_metrics() {
    metrics::describe_counter!("photo_jobs_processed_total", "Jobs analyzed and marked processed");
    metrics::describe_counter!("photo_jobs_failed_total", "Jobs whose analysis failed");
    metrics::describe_counter!(
        "photo_jobs_orphaned_total",
        "Messages discarded because no job matched them"
    );
    metrics::describe_counter!(
        "photo_jobs_load_failed_total",
        "Messages left unacknowledged because the job could not be loaded"
    );
    metrics::describe_counter!(
        "photo_jobs_status_write_failed_total",
        "Analysis results that could not be written back"
    );
    metrics::describe_histogram!(
        "photo_analysis_seconds",
        metrics::Unit::Seconds,
        "Analyzer run time"
    );
}

fn record_outcome(outcome: ProcessOutcome) {
    match outcome {
        ProcessOutcome::Processed(_) => metrics::counter!("photo_jobs_processed_total").increment(1),
        ProcessOutcome::Failed => metrics::counter!("photo_jobs_failed_total").increment(1),
        ProcessOutcome::Orphaned | ProcessOutcome::InvalidPayload => {
            metrics::counter!("photo_jobs_orphaned_total").increment(1)
        }
        ProcessOutcome::StoreUnavailable => {
            metrics::counter!("photo_jobs_load_failed_total").increment(1)
        }
        ProcessOutcome::StatusWriteFailed => {
            metrics::counter!("photo_jobs_status_write_failed_total").increment(1)
        }
    }
}
