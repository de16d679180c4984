use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

const QUEUE_KEY: &str = "viral_clip:jobs";
const PROCESSING_PREFIX: &str = "viral_clip:processing";

/// Job payload handed from the API to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub source_url: String,
}

/// Work queue between the API and the worker pool.
///
/// Delivery is at-least-once: a dequeued job stays in the consumer's
/// processing list until [`JobQueue::complete`] and is pushed back by
/// [`JobQueue::recover`] if the consumer died first.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Take the next job for `consumer`, if any. Does not block.
    async fn dequeue(&self, consumer: &str) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledge a job previously dequeued by `consumer`.
    async fn complete(&self, consumer: &str, job: &QueuedJob) -> Result<(), QueueError>;

    /// Requeue everything `consumer` had in flight. Returns how many jobs
    /// were moved back.
    async fn recover(&self, consumer: &str) -> Result<usize, QueueError>;

    /// Number of jobs waiting for a worker.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed reliable queue (RPOPLPUSH into a per-consumer list).
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    fn processing_key(consumer: &str) -> String {
        format!("{}:{}", PROCESSING_PREFIX, consumer)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self, consumer: &str) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, Self::processing_key(consumer))
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, consumer: &str, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(Self::processing_key(consumer), 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover(&self, consumer: &str) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let processing = Self::processing_key(consumer);
        let mut moved = 0;
        loop {
            let payload: Option<String> = conn
                .rpoplpush(&processing, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// In-process FIFO used when no broker is configured. Jobs do not survive
/// a restart.
#[derive(Default)]
pub struct MemoryJobQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.pending.lock().await.push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self, _consumer: &str) -> Result<Option<QueuedJob>, QueueError> {
        Ok(self.pending.lock().await.pop_front())
    }

    async fn complete(&self, _consumer: &str, _job: &QueuedJob) -> Result<(), QueueError> {
        Ok(())
    }

    async fn recover(&self, _consumer: &str) -> Result<usize, QueueError> {
        Ok(0)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.pending.lock().await.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(url: &str) -> QueuedJob {
        QueuedJob {
            job_id: Uuid::new_v4(),
            source_url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        let a = job("https://youtu.be/a");
        let b = job("https://youtu.be/b");
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 2);

        assert_eq!(queue.dequeue("w1").await.unwrap(), Some(a));
        assert_eq!(queue.dequeue("w2").await.unwrap(), Some(b));
        assert_eq!(queue.dequeue("w1").await.unwrap(), None);
    }

    #[test]
    fn test_payload_shape() {
        let j = job("https://www.instagram.com/reel/xyz/");
        let payload = serde_json::to_value(&j).unwrap();
        assert_eq!(payload["source_url"], "https://www.instagram.com/reel/xyz/");
        assert!(payload["job_id"].is_string());
    }

    #[test]
    fn test_processing_key_is_per_consumer() {
        assert_eq!(
            RedisJobQueue::processing_key("worker-3"),
            "viral_clip:processing:worker-3"
        );
    }

    /// Requires a running Redis reachable through REDIS_URL.
    #[tokio::test]
    #[ignore]
    async fn test_redis_redelivery_after_crash() {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL not set");
        let queue = RedisJobQueue::new(&url).expect("Failed to open Redis");
        let consumer = format!("test-{}", Uuid::new_v4());
        let queued = job("https://youtu.be/crash");

        queue.enqueue(&queued).await.unwrap();
        let taken = queue.dequeue(&consumer).await.unwrap().expect("no job");
        assert_eq!(taken.job_id, queued.job_id);

        // consumer "crashes" without completing
        assert_eq!(queue.recover(&consumer).await.unwrap(), 1);

        let again = queue.dequeue(&consumer).await.unwrap().expect("no redelivery");
        assert_eq!(again.job_id, queued.job_id);
        queue.complete(&consumer, &again).await.unwrap();
        assert_eq!(queue.recover(&consumer).await.unwrap(), 0);
    }
}
