use std::sync::Arc;
use std::time::Duration;

use crate::models::job::JobId;
use crate::services::queue::QueueChannel;

/// Publishes job IDs for the worker.
///
/// The caller must have created the job in the store before calling
/// [`Producer::enqueue`]; the producer does not check.
#[derive(Clone)]
pub struct Producer {
    channel: Arc<dyn QueueChannel>,
    timeout: Duration,
}

impl Producer {
    pub fn new(channel: Arc<dyn QueueChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    pub async fn enqueue(&self, job_id: &JobId) -> Result<(), EnqueueError> {
        match tokio::time::timeout(self.timeout, self.channel.publish(job_id.as_str())).await {
            Ok(Ok(())) => {
                tracing::debug!(job_id = %job_id, "Job enqueued");
                Ok(())
            }
            Ok(Err(e)) => Err(EnqueueError::EnqueueFailed {
                job_id: job_id.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(EnqueueError::EnqueueFailed {
                job_id: job_id.clone(),
                reason: format!("publish timed out after {:?}", self.timeout),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("Failed to enqueue job {job_id}: {reason}")]
    EnqueueFailed { job_id: JobId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::queue::MemoryQueue;

    #[tokio::test]
    async fn test_enqueue_publishes_raw_job_id() {
        let queue = Arc::new(MemoryQueue::new());
        let producer = Producer::new(queue.clone(), Duration::from_secs(1));

        producer.enqueue(&JobId::from("1001")).await.unwrap();

        let delivery = queue
            .receive(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, "1001");
    }

    #[tokio::test]
    async fn test_publish_failure_becomes_enqueue_failed() {
        let queue = Arc::new(MemoryQueue::new());
        queue.set_publish_failing(true);
        let producer = Producer::new(queue, Duration::from_secs(1));

        let err = producer.enqueue(&JobId::from("9")).await.unwrap_err();
        let EnqueueError::EnqueueFailed { job_id, .. } = err;
        assert_eq!(job_id.as_str(), "9");
    }
}
