//! # System Constants
//!
//! Job-type tags, coordination keys, and default tuning values that define the
//! operational boundaries of the staged sync pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job types recognized by the queue broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "sync:products")]
    Products,
    #[serde(rename = "sync:customers")]
    Customers,
    #[serde(rename = "sync:pricelists")]
    Pricelists,
    #[serde(rename = "sync:customer_statements")]
    CustomerStatements,
    #[serde(rename = "sync:orders")]
    Orders,
    #[serde(rename = "sync:invoices_and_lines")]
    InvoicesAndLines,
    #[serde(rename = "sync:orchestrate_full")]
    OrchestrateFull,
}

impl JobType {
    pub const ALL: &'static [JobType] = &[
        JobType::Products,
        JobType::Customers,
        JobType::Pricelists,
        JobType::CustomerStatements,
        JobType::Orders,
        JobType::InvoicesAndLines,
        JobType::OrchestrateFull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Products => "sync:products",
            JobType::Customers => "sync:customers",
            JobType::Pricelists => "sync:pricelists",
            JobType::CustomerStatements => "sync:customer_statements",
            JobType::Orders => "sync:orders",
            JobType::InvoicesAndLines => "sync:invoices_and_lines",
            JobType::OrchestrateFull => "sync:orchestrate_full",
        }
    }

    /// Whether this job is a stage job that must signal a barrier
    pub fn is_stage_job(&self) -> bool {
        !matches!(self, JobType::OrchestrateFull)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .find(|job_type| job_type.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid job type: {s}"))
    }
}

/// Coordination store keys
pub mod keys {
    /// Run lock held for the duration of one orchestration run
    pub const SYNC_RUNNING: &str = "sync_running";

    /// Stage 1 countdown barrier
    pub const CORE_TASKS_REMAINING: &str = "core_tasks_remaining";

    /// Stage 2 countdown barrier
    pub const ORDER_TASKS_REMAINING: &str = "order_tasks_remaining";
}

/// Default tuning values, overridable through configuration
pub mod defaults {
    /// Covers both waited stages (15 + 20 minutes) with headroom
    pub const LOCK_TTL_SECONDS: u64 = 40 * 60;
    pub const CORE_STAGE_TIMEOUT_SECONDS: u64 = 15 * 60;
    pub const ORDER_STAGE_TIMEOUT_SECONDS: u64 = 20 * 60;
    pub const POLL_INTERVAL_MS: u64 = 2_000;
    pub const SCHEDULE_INTERVAL_SECONDS: u64 = 60;
    pub const MAX_RETRIES: u32 = 3;
    pub const QUEUE_NAME: &str = "stagesync_jobs";
    /// Outlasts a full orchestration job so its message is not redelivered mid-run
    pub const VISIBILITY_TIMEOUT_SECONDS: u32 = 40 * 60;
    pub const RETRY_BACKOFF_SECONDS: u32 = 30;
    pub const BATCH_SIZE: u32 = 10;
    pub const WORKER_POLLING_INTERVAL_MS: u64 = 500;
    pub const WORKER_CONCURRENCY: usize = 10;
}

/// Job groupings per stage
pub mod stage_groups {
    use super::JobType;

    pub const CORE_JOBS: &[JobType] = &[
        JobType::Products,
        JobType::Customers,
        JobType::Pricelists,
        JobType::CustomerStatements,
    ];

    pub const ORDER_JOBS: &[JobType] = &[JobType::Orders, JobType::InvoicesAndLines];
}
