//! Per-stage work queues.
//!
//! One list per [`JobKind`], keyed `clipforge:queue:<type>`. Messages are
//! JSON [`QueueJob`]s pushed to the tail and popped from the head.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clipforge_core::types::{new_id, DbId, Timestamp};
use clipforge_db::models::job::{CreateJob, JobKind};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

const KEY_PREFIX: &str = "clipforge:queue";

pub fn queue_key(kind: JobKind) -> String {
    format!("{KEY_PREFIX}:{kind}")
}

/// Wire form of a queued stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Id of the matching `jobs` row.
    pub id: DbId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub project_id: DbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<DbId>,
    pub enqueued_at: Timestamp,
}

impl QueueJob {
    pub fn new(kind: JobKind, project_id: DbId, clip_id: Option<DbId>) -> Self {
        Self {
            id: new_id(),
            kind,
            project_id,
            clip_id,
            enqueued_at: Utc::now(),
        }
    }

    /// Insert payload for the audit row.
    pub fn record(&self) -> CreateJob {
        CreateJob {
            id: self.id,
            project_id: self.project_id,
            clip_id: self.clip_id,
            kind: self.kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed queue message: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueueJob) -> Result<(), QueueError>;

    /// Pop the oldest message for `kind`, waiting up to `timeout`.
    async fn dequeue(&self, kind: JobKind, timeout: Duration)
        -> Result<Option<QueueJob>, QueueError>;
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// [`JobQueue`] on Redis lists.
///
/// Each call opens its own connection so a blocking pop never stalls
/// other callers.
#[derive(Debug, Clone)]
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self, QueueError> {
        Ok(Self::new(redis::Client::open(url)?))
    }

    /// Round-trip a PING.
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &QueueJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = conn.rpush(queue_key(job.kind), payload).await?;
        tracing::debug!(job_id = %job.id, kind = %job.kind, "Job enqueued");
        Ok(())
    }

    async fn dequeue(
        &self,
        kind: JobKind,
        timeout: Duration,
    ) -> Result<Option<QueueJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(queue_key(kind))
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// [`JobQueue`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<JobKind, VecDeque<QueueJob>>>,
    notify: [Notify; 3],
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, kind: JobKind) -> &Notify {
        let idx = match kind {
            JobKind::Plan => 0,
            JobKind::ProcessClip => 1,
            JobKind::RenderFinal => 2,
        };
        &self.notify[idx]
    }

    fn pop(&self, kind: JobKind) -> Option<QueueJob> {
        self.lists
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
    }

    /// Messages currently waiting for `kind`, oldest first.
    pub fn pending(&self, kind: JobKind) -> Vec<QueueJob> {
        self.lists
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &QueueJob) -> Result<(), QueueError> {
        self.lists
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(job.kind)
            .or_default()
            .push_back(job.clone());
        self.notifier(job.kind).notify_one();
        Ok(())
    }

    async fn dequeue(
        &self,
        kind: JobKind,
        timeout: Duration,
    ) -> Result<Option<QueueJob>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notifier(kind).notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.pop(kind) {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop(kind));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wire_format_matches_contract() {
        let project_id: DbId = "0190f3a4-5b6c-7d8e-9f01-23456789abcd".parse().unwrap();
        let job = QueueJob::new(JobKind::ProcessClip, project_id, None);

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "process_clip");
        assert_eq!(value["project_id"], project_id.to_string());
        assert!(value.get("clip_id").is_none());
        assert!(value.get("enqueued_at").is_some());

        let parsed: QueueJob = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn keys_are_per_stage() {
        assert_eq!(queue_key(JobKind::Plan), "clipforge:queue:plan");
        assert_eq!(queue_key(JobKind::RenderFinal), "clipforge:queue:render_final");
    }

    #[tokio::test]
    async fn memory_queue_is_fifo_per_kind() {
        let queue = MemoryQueue::new();
        let project_id = new_id();
        let first = QueueJob::new(JobKind::ProcessClip, project_id, Some(new_id()));
        let second = QueueJob::new(JobKind::ProcessClip, project_id, Some(new_id()));
        let plan = QueueJob::new(JobKind::Plan, project_id, None);

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&plan).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let wait = Duration::from_millis(10);
        assert_eq!(queue.dequeue(JobKind::ProcessClip, wait).await.unwrap(), Some(first));
        assert_eq!(queue.dequeue(JobKind::ProcessClip, wait).await.unwrap(), Some(second));
        assert_eq!(queue.dequeue(JobKind::Plan, wait).await.unwrap(), Some(plan));
    }

    #[tokio::test(start_paused = true)]
    async fn memory_queue_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let start = tokio::time::Instant::now();
        let popped = queue
            .dequeue(JobKind::RenderFinal, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(popped, None);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(MemoryQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(JobKind::Plan, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let job = QueueJob::new(JobKind::Plan, new_id(), None);
        queue.enqueue(&job).await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Some(job));
    }
}
