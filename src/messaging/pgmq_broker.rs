//! # PostgreSQL Message Queue Broker (pgmq-rs)
//!
//! Queue broker on a single pgmq queue. A received job stays hidden for the
//! visibility timeout, long enough for a full orchestration job; a job from a
//! crashed worker reappears once it lapses. A failed attempt is rescheduled with
//! `set_vt` to reappear after the retry backoff instead. `read_ct` becomes the
//! delivery attempt number.

use async_trait::async_trait;
use chrono::Utc;
use pgmq::PGMQueue;
use tracing::{debug, info, warn};

use super::broker::{JobSource, QueueBroker};
use super::message::{Delivery, JobHandle, SyncJobMessage};
use crate::config::QueueConfig;
use crate::constants::JobType;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct PgmqQueueBroker {
    pgmq: PGMQueue,
    queue_name: String,
    max_retries: u32,
    visibility_timeout_seconds: i32,
    retry_backoff: chrono::Duration,
}

impl PgmqQueueBroker {
    /// Create a broker on an existing connection pool
    pub async fn new_with_pool(pool: sqlx::PgPool, config: &QueueConfig) -> Self {
        info!(queue = %config.queue_name, "🚀 Creating pgmq broker with shared connection pool");

        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self {
            pgmq,
            queue_name: config.queue_name.clone(),
            max_retries: config.max_retries,
            visibility_timeout_seconds: i32::try_from(config.visibility_timeout_seconds)
                .unwrap_or(i32::MAX),
            retry_backoff: chrono::Duration::seconds(i64::from(config.retry_backoff_seconds)),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Create the job queue if it doesn't exist
    pub async fn ensure_queue(&self) -> Result<()> {
        self.pgmq
            .create(&self.queue_name)
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "create", e.to_string()))?;
        info!(queue = %self.queue_name, "✅ Queue ready");
        Ok(())
    }
}

#[async_trait]
impl QueueBroker for PgmqQueueBroker {
    async fn enqueue(&self, job_type: JobType) -> Result<JobHandle> {
        let message = SyncJobMessage::new(job_type, self.max_retries);

        let message_id = self
            .pgmq
            .send(&self.queue_name, &message)
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "send", e.to_string()))?;

        debug!(
            queue = %self.queue_name,
            job_type = %job_type,
            message_id,
            "📤 Job enqueued"
        );

        Ok(JobHandle {
            job_id: message.job_id,
            job_type,
            message_id,
            queue_name: self.queue_name.clone(),
        })
    }
}

#[async_trait]
impl JobSource for PgmqQueueBroker {
    async fn receive(&self, limit: u32) -> Result<Vec<Delivery>> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let messages = self
            .pgmq
            .read_batch::<SyncJobMessage>(
                &self.queue_name,
                Some(self.visibility_timeout_seconds),
                limit,
            )
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "read", e.to_string()))?
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .map(|msg| Delivery {
                message_id: msg.msg_id,
                attempt: u32::try_from(msg.read_ct).unwrap_or(1).max(1),
                message: msg.message,
            })
            .collect())
    }

    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        self.pgmq
            .delete(&self.queue_name, delivery.message_id)
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "delete", e.to_string()))?;
        debug!(message_id = delivery.message_id, "✅ Job acknowledged");
        Ok(())
    }

    async fn retry_later(&self, delivery: &Delivery) -> Result<()> {
        let visible_at = Utc::now() + self.retry_backoff;
        self.pgmq
            .set_vt::<SyncJobMessage>(&self.queue_name, delivery.message_id, visible_at)
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "set_vt", e.to_string()))?;
        debug!(
            message_id = delivery.message_id,
            attempt = delivery.attempt,
            visible_at = %visible_at,
            "🔁 Job rescheduled for retry"
        );
        Ok(())
    }

    async fn fail_permanently(&self, delivery: &Delivery) -> Result<()> {
        self.pgmq
            .archive(&self.queue_name, delivery.message_id)
            .await
            .map_err(|e| SyncError::queue_operation(&self.queue_name, "archive", e.to_string()))?;
        warn!(
            message_id = delivery.message_id,
            job_type = %delivery.job_type(),
            attempts = delivery.attempt,
            "📦 Job archived after exhausting retries"
        );
        Ok(())
    }
}
