use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// A message handed out by a [`QueueChannel`] that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Raw UTF-8 payload as published. For this service, a job ID.
    pub payload: String,
}

/// At-least-once transport of opaque string payloads.
///
/// A received message stays in flight until [`QueueChannel::ack`] is called.
/// In-flight messages left behind by a crashed consumer come back through
/// [`QueueChannel::requeue_unacked`], so the same payload may be seen twice.
#[async_trait]
pub trait QueueChannel: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<(), QueueError>;

    /// Wait up to `wait` for the next message. `Ok(None)` means nothing arrived.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move every unacknowledged message back onto the queue. Returns how many moved.
    async fn requeue_unacked(&self) -> Result<u64, QueueError>;

    /// Number of messages waiting to be received.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed: {0}")]
    Ack(String),

    #[error("Queue connection failed: {0}")]
    Connect(String),
}

/// Lazy, endless stream of deliveries from `channel`.
///
/// Each poll blocks for at most `wait` inside the channel, then loops. Receive
/// errors are yielded to the caller and the stream keeps going. The stream ends
/// only once `shutdown` is cancelled; a receive already in progress is dropped
/// and, having not been acknowledged, is redelivered later.
pub fn subscribe(
    channel: Arc<dyn QueueChannel>,
    wait: Duration,
    shutdown: CancellationToken,
) -> BoxStream<'static, Result<Delivery, QueueError>> {
    stream::unfold((channel, shutdown), move |(channel, shutdown)| async move {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            let received = tokio::select! {
                _ = shutdown.cancelled() => return None,
                received = channel.receive(wait) => received,
            };
            match received {
                Ok(Some(delivery)) => return Some((Ok(delivery), (channel, shutdown))),
                Ok(None) => continue,
                Err(e) => {
                    // Back off briefly so a dead connection does not spin.
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    return Some((Err(e), (channel, shutdown)));
                }
            }
        }
    })
    .boxed()
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<String>,
    in_flight: Vec<String>,
}

/// In-process queue with the same delivery semantics as the Redis queue.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
    notify: Notify,
    fail_publish: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail until reset.
    pub fn set_publish_failing(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl QueueChannel for MemoryQueue {
    async fn publish(&self, payload: &str) -> Result<(), QueueError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::PublishFailed("memory queue rejecting publishes".to_string()));
        }
        self.state.lock().await.ready.push_back(payload.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(payload) = state.ready.pop_front() {
                    state.in_flight.push(payload.clone());
                    return Ok(Some(Delivery { payload }));
                }
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.in_flight.iter().position(|p| *p == delivery.payload) {
            state.in_flight.remove(pos);
        }
        Ok(())
    }

    async fn requeue_unacked(&self) -> Result<u64, QueueError> {
        let moved = {
            let mut state = self.state.lock().await;
            let moved: Vec<String> = state.in_flight.drain(..).collect();
            state.ready.extend(moved.iter().cloned());
            moved.len() as u64
        };
        for _ in 0..moved {
            self.notify.notify_one();
        }
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().await.ready.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_fifo_order_and_ack() {
        let queue = MemoryQueue::new();
        queue.publish("1").await.unwrap();
        queue.publish("2").await.unwrap();

        let first = queue.receive(WAIT).await.unwrap().unwrap();
        let second = queue.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(first.payload, "1");
        assert_eq!(second.payload, "2");
        assert_eq!(queue.in_flight().await, 2);

        queue.ack(&first).await.unwrap();
        queue.ack(&second).await.unwrap();
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_receive_times_out_when_empty() {
        let queue = MemoryQueue::new();
        assert!(queue.receive(WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered() {
        let queue = MemoryQueue::new();
        queue.publish("42").await.unwrap();
        let delivery = queue.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);

        assert_eq!(queue.requeue_unacked().await.unwrap(), 1);
        let again = queue.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(again, delivery);
    }

    #[tokio::test]
    async fn test_failing_publish() {
        let queue = MemoryQueue::new();
        queue.set_publish_failing(true);
        assert!(matches!(
            queue.publish("1").await,
            Err(QueueError::PublishFailed(_))
        ));
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let queue = Arc::new(MemoryQueue::new());
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish("late").await.unwrap();

        let delivery = receiver.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.payload, "late");
    }

    #[tokio::test]
    async fn test_subscribe_ends_on_shutdown() {
        let queue: Arc<dyn QueueChannel> = Arc::new(MemoryQueue::new());
        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();

        let shutdown = CancellationToken::new();
        let mut deliveries = subscribe(queue.clone(), WAIT, shutdown.clone());

        assert_eq!(deliveries.next().await.unwrap().unwrap().payload, "a");
        assert_eq!(deliveries.next().await.unwrap().unwrap().payload, "b");

        shutdown.cancel();
        assert!(deliveries.next().await.is_none());
    }
}
