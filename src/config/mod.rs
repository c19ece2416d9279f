//! # StageSync Configuration System
//!
//! YAML-based configuration with environment-specific overrides. Every tuning
//! value the orchestrator uses (lock TTL, stage timeouts, poll interval, stage
//! membership) lives here so it can change without a code change.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stagesync_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let lock_ttl = manager.config().coordination.lock_ttl();
//! let poll = manager.config().orchestration.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, keys, stage_groups, JobType};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring stagesync-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StageSyncConfig {
    /// Database connection settings shared by the coordination store and pgmq
    pub database: DatabaseConfig,

    /// Run lock settings
    pub coordination: CoordinationConfig,

    /// Stage membership, barrier keys and timeouts
    pub stages: StagesConfig,

    /// Orchestrator and scheduler behaviour
    pub orchestration: OrchestrationConfig,

    /// Job queue and worker settings
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; `${VAR}` is expanded from the environment
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "stagesync_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 10,
        }
    }
}

impl DatabaseConfig {
    /// Connection URL, preferring an explicit `url`
    pub fn database_url(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            ),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub lock_key: String,
    pub lock_ttl_seconds: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            lock_key: keys::SYNC_RUNNING.to_string(),
            lock_ttl_seconds: defaults::LOCK_TTL_SECONDS,
        }
    }
}

impl CoordinationConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StageConfig {
    pub barrier_key: String,
    pub timeout_seconds: u64,
    pub jobs: Vec<JobType>,
}

impl StageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn core() -> Self {
        Self {
            barrier_key: keys::CORE_TASKS_REMAINING.to_string(),
            timeout_seconds: defaults::CORE_STAGE_TIMEOUT_SECONDS,
            jobs: stage_groups::CORE_JOBS.to_vec(),
        }
    }

    fn order() -> Self {
        Self {
            barrier_key: keys::ORDER_TASKS_REMAINING.to_string(),
            timeout_seconds: defaults::ORDER_STAGE_TIMEOUT_SECONDS,
            jobs: stage_groups::ORDER_JOBS.to_vec(),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::core()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagesConfig {
    pub core: StageConfig,
    pub order: StageConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            core: StageConfig::core(),
            order: StageConfig::order(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub poll_interval_ms: u64,
    /// Hold the lock until every order-stage job signals. When false the lock is
    /// released right after the order stage is enqueued.
    pub wait_for_stage2: bool,
    pub schedule_interval_seconds: u64,
    pub enqueue_on_startup: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            wait_for_stage2: true,
            schedule_interval_seconds: defaults::SCHEDULE_INTERVAL_SECONDS,
            enqueue_on_startup: true,
        }
    }
}

impl OrchestrationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub queue_name: String,
    pub max_retries: u32,
    pub visibility_timeout_seconds: u32,
    /// Delay before a failed, non-final attempt becomes visible again
    pub retry_backoff_seconds: u32,
    pub batch_size: u32,
    pub polling_interval_ms: u64,
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: defaults::QUEUE_NAME.to_string(),
            max_retries: defaults::MAX_RETRIES,
            visibility_timeout_seconds: defaults::VISIBILITY_TIMEOUT_SECONDS,
            retry_backoff_seconds: defaults::RETRY_BACKOFF_SECONDS,
            batch_size: defaults::BATCH_SIZE,
            polling_interval_ms: defaults::WORKER_POLLING_INTERVAL_MS,
            concurrency: defaults::WORKER_CONCURRENCY,
        }
    }
}

impl QueueConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.visibility_timeout_seconds))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(u64::from(self.retry_backoff_seconds))
    }
}

impl StageSyncConfig {
    /// Validate configuration values.
    ///
    /// The lock TTL and the queue visibility timeout must both outlast the
    /// waited stage timeouts, and every retry of a stage job must fit inside
    /// the shortest stage window.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.coordination.lock_key.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "lock_key",
                "coordination",
            ));
        }
        if self.coordination.lock_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "coordination.lock_ttl_seconds",
                "0",
                "lock TTL must be positive",
            ));
        }
        if self.orchestration.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.poll_interval_ms",
                "0",
                "poll interval must be positive",
            ));
        }
        if self.orchestration.schedule_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.schedule_interval_seconds",
                "0",
                "schedule interval must be positive",
            ));
        }

        for (name, stage) in [("core", &self.stages.core), ("order", &self.stages.order)] {
            if stage.barrier_key.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "barrier_key",
                    format!("stages.{name}"),
                ));
            }
            if stage.jobs.is_empty() {
                return Err(ConfigurationError::invalid_value(
                    format!("stages.{name}.jobs"),
                    "[]",
                    "a stage needs at least one job",
                ));
            }
            if let Some(job) = stage.jobs.iter().find(|job| !job.is_stage_job()) {
                return Err(ConfigurationError::invalid_value(
                    format!("stages.{name}.jobs"),
                    job.as_str(),
                    "the orchestration job cannot be part of a stage",
                ));
            }
            if stage.timeout() <= self.orchestration.poll_interval() {
                return Err(ConfigurationError::invalid_value(
                    format!("stages.{name}.timeout_seconds"),
                    stage.timeout_seconds.to_string(),
                    "stage timeout must exceed the poll interval",
                ));
            }
        }

        if self.stages.core.barrier_key == self.stages.order.barrier_key {
            return Err(ConfigurationError::invalid_value(
                "stages.order.barrier_key",
                self.stages.order.barrier_key.clone(),
                "stages must use distinct barrier keys",
            ));
        }
        if self.queue.concurrency == 0 || self.queue.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.concurrency",
                self.queue.concurrency.to_string(),
                "worker concurrency and batch size must be positive",
            ));
        }

        let waited = self.waited_stage_timeout();
        if self.coordination.lock_ttl() <= waited {
            return Err(ConfigurationError::invalid_value(
                "coordination.lock_ttl_seconds",
                self.coordination.lock_ttl_seconds.to_string(),
                format!(
                    "lock TTL must exceed the waited stage timeouts ({}s)",
                    waited.as_secs()
                ),
            ));
        }
        if self.queue.visibility_timeout() <= waited {
            return Err(ConfigurationError::invalid_value(
                "queue.visibility_timeout_seconds",
                self.queue.visibility_timeout_seconds.to_string(),
                format!(
                    "visibility timeout must exceed the waited stage timeouts ({}s)",
                    waited.as_secs()
                ),
            ));
        }

        let shortest_stage = self.stages.core.timeout().min(self.stages.order.timeout());
        let retry_window = self.queue.retry_backoff() * self.queue.max_retries;
        if retry_window >= shortest_stage {
            return Err(ConfigurationError::invalid_value(
                "queue.retry_backoff_seconds",
                self.queue.retry_backoff_seconds.to_string(),
                format!(
                    "{} retries must fit inside the shortest stage timeout ({}s)",
                    self.queue.max_retries,
                    shortest_stage.as_secs()
                ),
            ));
        }

        Ok(())
    }

    /// Sum of the stage timeouts the orchestrator waits on while holding the lock
    pub fn waited_stage_timeout(&self) -> Duration {
        let mut total = self.stages.core.timeout();
        if self.orchestration.wait_for_stage2 {
            total += self.stages.order.timeout();
        }
        total
    }

    /// The job type list for a complete run, in stage order
    pub fn all_stage_jobs(&self) -> Vec<JobType> {
        self.stages
            .core
            .jobs
            .iter()
            .chain(self.stages.order.jobs.iter())
            .copied()
            .collect()
    }
}
