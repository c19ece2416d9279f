//! Stage definitions: a fixed set of job types dispatched together and
//! tracked by a single barrier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{StageConfig, StageSyncConfig};
use crate::constants::JobType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Stage 1: master data every later stage depends on
    Core,
    /// Stage 2: orders and invoices, which reference core data
    Order,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Core => "core",
            StageName::Order => "order",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: StageName,
    pub job_types: Vec<JobType>,
    pub barrier_key: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Stage {
    pub fn from_config(name: StageName, stage: &StageConfig, poll_interval: Duration) -> Self {
        Self {
            name,
            job_types: stage.jobs.clone(),
            barrier_key: stage.barrier_key.clone(),
            wait_timeout: stage.timeout(),
            poll_interval,
        }
    }

    /// Number of signals the barrier waits for
    pub fn target_count(&self) -> i64 {
        self.job_types.len() as i64
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.job_types.contains(&job_type)
    }
}

/// Both stages of the pipeline, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub core: Stage,
    pub order: Stage,
}

impl StagePlan {
    pub fn from_config(config: &StageSyncConfig) -> Self {
        let poll_interval = config.orchestration.poll_interval();
        Self {
            core: Stage::from_config(StageName::Core, &config.stages.core, poll_interval),
            order: Stage::from_config(StageName::Order, &config.stages.order, poll_interval),
        }
    }

    /// The stage a job belongs to, if any
    pub fn stage_for(&self, job_type: JobType) -> Option<&Stage> {
        [&self.core, &self.order]
            .into_iter()
            .find(|stage| stage.contains(job_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_default_config() {
        let plan = StagePlan::from_config(&StageSyncConfig::default());
        assert_eq!(plan.core.target_count(), 4);
        assert_eq!(plan.order.target_count(), 2);
        assert_eq!(plan.core.barrier_key, "core_tasks_remaining");
        assert_eq!(plan.order.barrier_key, "order_tasks_remaining");
        assert_eq!(plan.core.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_stage_for_job_type() {
        let plan = StagePlan::from_config(&StageSyncConfig::default());
        assert_eq!(
            plan.stage_for(JobType::Pricelists).map(|s| s.name),
            Some(StageName::Core)
        );
        assert_eq!(
            plan.stage_for(JobType::InvoicesAndLines).map(|s| s.name),
            Some(StageName::Order)
        );
        assert!(plan.stage_for(JobType::OrchestrateFull).is_none());
    }
}
