//! Redis-backed durable work queue for translation jobs and backfill cursors.
//!
//! Popped entries move to a `:processing` list until acknowledged, so a worker
//! that dies mid-batch leaves its entries recoverable with
//! [`WorkQueue::requeue_unacked`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::ItemRef;
use crate::locale::LocaleTag;

/// Queue holding jobs raised by content events.
pub const JOBS_QUEUE: &str = "translation:jobs";

/// Queue holding the continuation cursor of a backfill kind.
pub fn cursor_queue(kind: crate::content::ContentKind) -> String {
    format!("backfill:cursor:{kind}")
}

/// Durable queue operations.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append an entry.
    async fn push(&self, queue: &str, item: &str) -> Result<()>;

    /// Take up to `max` entries, oldest first, moving them to processing.
    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>>;

    /// Drop a processed entry.
    async fn ack(&self, queue: &str, item: &str) -> Result<()>;

    /// Move unacknowledged entries back to the head of the queue.
    async fn requeue_unacked(&self, queue: &str) -> Result<u64>;

    /// Number of entries waiting.
    async fn len(&self, queue: &str) -> Result<u64>;

    async fn is_empty(&self, queue: &str) -> Result<bool> {
        Ok(self.len(queue).await? == 0)
    }
}

/// Redis list implementation.
#[derive(Clone)]
pub struct RedisQueue {
    redis: RedisClient,
}

impl RedisQueue {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn queue_key(queue: &str) -> String {
        format!("queue:{queue}")
    }

    fn processing_key(queue: &str) -> String {
        format!("queue:{queue}:processing")
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn push(&self, queue: &str, item: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(Self::queue_key(queue), item)
            .await
            .context("failed to push to queue")?;

        debug!(queue = %queue, "pushed item to queue");
        Ok(())
    }

    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let source = Self::queue_key(queue);
        let processing = Self::processing_key(queue);

        let mut items = Vec::with_capacity(max.min(64));
        for _ in 0..max {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(&source)
                .arg(&processing)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .context("failed to pop from queue")?;
            match item {
                Some(item) => items.push(item),
                None => break,
            }
        }

        if !items.is_empty() {
            debug!(queue = %queue, count = items.len(), "popped items from queue");
        }
        Ok(items)
    }

    async fn ack(&self, queue: &str, item: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(Self::processing_key(queue), 1, item)
            .await
            .context("failed to acknowledge queue item")?;
        Ok(())
    }

    async fn requeue_unacked(&self, queue: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let source = Self::queue_key(queue);
        let processing = Self::processing_key(queue);

        let mut moved = 0u64;
        loop {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(&source)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await
                .context("failed to requeue item")?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }

        if moved > 0 {
            debug!(queue = %queue, count = moved, "requeued unacknowledged items");
        }
        Ok(moved)
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn
            .llen(Self::queue_key(queue))
            .await
            .context("failed to get queue length")?;
        Ok(len)
    }
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").finish()
    }
}

/// What a queued job does to its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOperation {
    Detect,
    Translate,
}

/// How a job failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Return the error to the caller.
    Surface,
    /// Log by severity and continue.
    #[default]
    LogAndSkip,
}

/// A unit of queued translation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub item: ItemRef,
    pub operation: JobOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<LocaleTag>,
    #[serde(default)]
    pub policy: FailurePolicy,
    /// Times this job was requeued after a transient failure.
    #[serde(default)]
    pub attempts: u32,
}

impl TranslationJob {
    pub fn detect(item: ItemRef) -> Self {
        Self {
            item,
            operation: JobOperation::Detect,
            target: None,
            policy: FailurePolicy::LogAndSkip,
            attempts: 0,
        }
    }

    pub fn translate(item: ItemRef, target: LocaleTag) -> Self {
        Self {
            item,
            operation: JobOperation::Translate,
            target: Some(target),
            policy: FailurePolicy::LogAndSkip,
            attempts: 0,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize translation job")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse translation job")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::ContentKind;

    #[test]
    fn queue_keys() {
        assert_eq!(RedisQueue::queue_key("translation:jobs"), "queue:translation:jobs");
        assert_eq!(
            RedisQueue::processing_key("translation:jobs"),
            "queue:translation:jobs:processing"
        );
        assert_eq!(cursor_queue(ContentKind::Topic), "backfill:cursor:topic");
    }

    #[test]
    fn job_json_shape() {
        let job = TranslationJob::translate(ItemRef::post(7), "pt_BR".parse().unwrap());
        let json: serde_json::Value = serde_json::from_str(&job.to_json().unwrap()).unwrap();
        assert_eq!(json["item"]["kind"], "post");
        assert_eq!(json["operation"], "translate");
        assert_eq!(json["target"], "pt-BR");
        assert_eq!(json["policy"], "log_and_skip");
    }

    #[test]
    fn detect_jobs_omit_target_and_default_policy() {
        let job = TranslationJob::from_json(
            r#"{"item":{"kind":"tag","id":3},"operation":"detect"}"#,
        )
        .unwrap();
        assert_eq!(job, TranslationJob::detect(ItemRef::new(ContentKind::Tag, 3)));
        assert!(!job.to_json().unwrap().contains("target"));
    }

    #[test]
    fn malformed_jobs_are_errors() {
        assert!(TranslationJob::from_json("{").is_err());
        assert!(TranslationJob::from_json(r#"{"item":{"kind":"wiki","id":1},"operation":"detect"}"#).is_err());
    }
}
