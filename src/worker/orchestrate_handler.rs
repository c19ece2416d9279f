//! Built-in handler for `sync:orchestrate_full`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::handler::{JobContext, JobError, SyncJobHandler};
use crate::constants::JobType;
use crate::orchestration::{OrchestrationState, Orchestrator};

/// Runs the full sync pipeline for each orchestrate job.
///
/// Contention and stage-level failures are reported by the orchestrator and end
/// the job; only coordination store errors fail it and leave it to the broker's
/// retries.
#[derive(Debug, Clone)]
pub struct OrchestrateFullSyncHandler {
    orchestrator: Arc<Orchestrator>,
}

impl OrchestrateFullSyncHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl SyncJobHandler for OrchestrateFullSyncHandler {
    fn job_type(&self) -> JobType {
        JobType::OrchestrateFull
    }

    async fn handle(&self, context: &JobContext) -> Result<(), JobError> {
        let outcome = self.orchestrator.run_full_sync().await?;

        match outcome.final_state {
            OrchestrationState::Failed => {
                if let Some(failure) = &outcome.failure {
                    warn!(
                        job_id = %context.job_id,
                        run_id = %outcome.run_id,
                        stage = %failure.stage,
                        error = %failure.error,
                        "Full sync run failed"
                    );
                }
            }
            state => {
                info!(
                    job_id = %context.job_id,
                    run_id = %outcome.run_id,
                    final_state = %state,
                    submitted = outcome.submitted.len(),
                    "Full sync run finished"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSyncConfig;
    use crate::coordination::{CoordinationStore, InMemoryCoordinationStore};
    use crate::messaging::InMemoryQueueBroker;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_lock_contention_is_success() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        store
            .set_if_absent("sync_running", "other", Duration::from_secs(600))
            .await
            .unwrap();
        let broker = Arc::new(InMemoryQueueBroker::default());
        let orchestrator = Orchestrator::new(store, broker.clone(), &StageSyncConfig::default());
        let handler = OrchestrateFullSyncHandler::new(Arc::new(orchestrator));

        let context = JobContext {
            job_id: Uuid::new_v4(),
            job_type: JobType::OrchestrateFull,
            message_id: 1,
            attempt: 1,
            max_retries: 3,
        };

        assert_eq!(handler.handle(&context).await, Ok(()));
        assert!(broker.submitted().is_empty());
    }
}
