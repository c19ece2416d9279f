//! # Error Types
//!
//! Structured error handling for the coordinator using thiserror.
//!
//! Lock contention is deliberately absent: a held lock is an expected outcome
//! (`OrchestrationState::SkippedLocked`), not a failure.

use std::time::Duration;
use thiserror::Error;

use crate::constants::JobType;
use crate::orchestration::StageName;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A coordination store operation failed for connectivity or query reasons
    #[error("Coordination store unavailable: {operation}: {message}")]
    StoreUnavailable { operation: String, message: String },

    /// Submitting a job to the queue broker failed
    #[error("Failed to enqueue {job_type} for stage {stage}: {message}")]
    EnqueueFailure {
        stage: StageName,
        job_type: JobType,
        message: String,
    },

    /// Not every job of a stage signalled before the stage timeout
    #[error("Stage {stage} barrier timed out after {}s", timeout.as_secs())]
    BarrierTimeout { stage: StageName, timeout: Duration },

    /// Broker-side failure outside of a stage submission (receive, ack, archive)
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A job handler reported a failure
    #[error("Handler for {job_type} failed: {message}")]
    Handler { job_type: JobType, message: String },

    #[error("Handler registry error: {0}")]
    Registry(String),
}

impl SyncError {
    pub fn store_unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error came from the coordination store
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::store_unavailable("pool", "connection pool timed out"),
            sqlx::Error::PoolClosed => Self::store_unavailable("pool", "connection pool is closed"),
            sqlx::Error::Configuration(config_err) => {
                Self::Configuration(format!("database: {config_err}"))
            }
            other => Self::store_unavailable("query", other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
