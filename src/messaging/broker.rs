//! Broker seams: the orchestrator only submits, workers only consume.

use async_trait::async_trait;

use super::message::{Delivery, JobHandle};
use crate::constants::JobType;
use crate::error::Result;

/// Job submission, the sole broker contract the orchestrator depends on
#[async_trait]
pub trait QueueBroker: Send + Sync + std::fmt::Debug {
    async fn enqueue(&self, job_type: JobType) -> Result<JobHandle>;
}

/// Job consumption with retry bookkeeping for workers
#[async_trait]
pub trait JobSource: Send + Sync + std::fmt::Debug {
    /// Take up to `limit` visible jobs
    async fn receive(&self, limit: u32) -> Result<Vec<Delivery>>;

    /// Acknowledge a successfully handled job
    async fn complete(&self, delivery: &Delivery) -> Result<()>;

    /// Leave a failed job for redelivery
    async fn retry_later(&self, delivery: &Delivery) -> Result<()>;

    /// Move a job whose retries are exhausted out of the live queue
    async fn fail_permanently(&self, delivery: &Delivery) -> Result<()>;
}
