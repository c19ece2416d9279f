//! Recurring trigger for full sync runs.
//!
//! The scheduler only submits `sync:orchestrate_full` jobs. Overlapping runs are
//! excluded by the run lock inside the orchestrator, so the startup submission and
//! the interval submissions need no coordination of their own.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::OrchestrationConfig;
use crate::constants::JobType;
use crate::error::Result;
use crate::messaging::{JobHandle, QueueBroker};

#[derive(Debug, Clone)]
pub struct OrchestrationScheduler {
    broker: Arc<dyn QueueBroker>,
    interval: Duration,
    enqueue_on_startup: bool,
}

impl OrchestrationScheduler {
    pub fn new(broker: Arc<dyn QueueBroker>, config: &OrchestrationConfig) -> Self {
        Self {
            broker,
            interval: config.schedule_interval(),
            enqueue_on_startup: config.enqueue_on_startup,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Submit one orchestrate job now
    pub async fn trigger(&self) -> Result<JobHandle> {
        let handle = self.broker.enqueue(JobType::OrchestrateFull).await?;
        debug!(message_id = handle.message_id, "⏰ Full sync triggered");
        Ok(handle)
    }

    /// Run until `shutdown` fires, returning how many triggers were submitted
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!(
            interval_seconds = self.interval.as_secs(),
            enqueue_on_startup = self.enqueue_on_startup,
            "🚀 Starting orchestration scheduler"
        );

        let mut submitted = 0;
        if self.enqueue_on_startup {
            submitted += self.trigger_logged().await;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    submitted += self.trigger_logged().await;
                }
                _ = shutdown.recv() => {
                    debug!("Shutdown signal received by scheduler");
                    break;
                }
            }
        }

        info!(submitted, "🛑 Orchestration scheduler stopped");
        submitted
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn trigger_logged(&self) -> u64 {
        match self.trigger().await {
            Ok(_) => 1,
            Err(e) => {
                error!(error = %e, "❌ Failed to submit scheduled full sync");
                0
            }
        }
    }
}
