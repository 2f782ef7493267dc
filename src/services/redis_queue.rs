use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::services::queue::{Delivery, QueueChannel, QueueError};

/// Redis-backed reliable queue.
///
/// Publishing pushes onto the queue list. Receiving atomically moves the
/// message into a processing list with `BRPOPLPUSH`, and acking removes it
/// from there. Whatever is left in the processing list after a crash is put
/// back by [`QueueChannel::requeue_unacked`].
pub struct RedisQueue {
    conn: MultiplexedConnection,
    // Blocking receives get their own connection so they never stall
    // publishes and acks queued behind them on the multiplexed pipe.
    blocking_conn: MultiplexedConnection,
    queue_key: String,
    processing_key: String,
}

impl RedisQueue {
    /// Open both connections. Nothing is retried here.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| QueueError::Connect(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;
        let blocking_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        Ok(Self {
            conn,
            blocking_conn,
            queue_key: queue_name.to_string(),
            processing_key: format!("{}:processing", queue_name),
        })
    }
}

#[async_trait]
impl QueueChannel for RedisQueue {
    async fn publish(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.queue_key, payload)
            .await
            .map_err(|e| QueueError::PublishFailed(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.blocking_conn.clone();
        // A zero timeout blocks forever in Redis, so never send one.
        let wait_secs = wait.as_secs().max(1);
        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg(wait_secs)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;

        Ok(payload.map(|payload| Delivery { payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.payload)
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))?;
        Ok(())
    }

    async fn requeue_unacked(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0u64;
        loop {
            let payload: Option<String> = conn
                .rpoplpush(&self.processing_key, &self.queue_key)
                .await
                .map_err(|e| QueueError::Receive(e.to_string()))?;
            match payload {
                Some(_) => moved += 1,
                None => return Ok(moved),
            }
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn
            .llen(&self.queue_key)
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;
        Ok(())
    }
}
