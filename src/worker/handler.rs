//! Job handler seam.
//!
//! Handlers for the stage jobs perform the actual data sync and are supplied by
//! the embedding application. They never touch the stage barriers: completion is
//! signalled by the worker around the handler call.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::constants::JobType;
use crate::messaging::Delivery;

/// Per-attempt context passed to a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub message_id: i64,
    /// 1-based delivery count
    pub attempt: u32,
    pub max_retries: u32,
}

impl JobContext {
    pub fn from_delivery(delivery: &Delivery) -> Self {
        Self {
            job_id: delivery.message.job_id,
            job_type: delivery.message.job_type,
            message_id: delivery.message_id,
            attempt: delivery.attempt,
            max_retries: delivery.message.max_retries,
        }
    }

    /// True when a failure on this attempt will not be retried
    pub fn is_final_attempt(&self) -> bool {
        self.attempt > self.max_retries
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job handler panicked: {0}")]
    Panicked(String),

    #[error("No handler registered for {0}")]
    NoHandler(JobType),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<crate::error::SyncError> for JobError {
    fn from(err: crate::error::SyncError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Work for a single job type
#[async_trait]
pub trait SyncJobHandler: Send + Sync + std::fmt::Debug {
    fn job_type(&self) -> JobType;

    async fn handle(&self, context: &JobContext) -> Result<(), JobError>;
}
