//! # Orchestrator
//!
//! Drives one full sync run: take the run lock, dispatch the core stage and wait
//! on its barrier, then dispatch the order stage and (optionally) wait on its
//! barrier, releasing the lock on every exit path once it is held.
//!
//! ## Outcomes
//!
//! - Lock contention ends the run as [`OrchestrationState::SkippedLocked`] with
//!   no side effects.
//! - A failed submission or a barrier timeout ends the run as
//!   [`OrchestrationState::Failed`] and is reported through
//!   [`OrchestrationOutcome::failure`], not as an `Err`.
//! - Coordination store errors are returned as `Err` after the lock and the
//!   current stage's barrier are cleaned up best-effort.
//!
//! Jobs that were already submitted when a run aborts still execute and signal;
//! their signals land on a deleted barrier key and are ignored.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::stage::{Stage, StageName, StagePlan};
use super::states::OrchestrationState;
use crate::config::StageSyncConfig;
use crate::coordination::{BarrierWaitOutcome, CoordinationStore, DistributedLock, StageBarrier};
use crate::error::{Result, SyncError};
use crate::logging::{log_error, log_orchestration_operation};
use crate::messaging::{JobHandle, QueueBroker};

/// One recorded state change of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: OrchestrationState,
    pub to: OrchestrationState,
    pub at: DateTime<Utc>,
}

/// Why a run ended in `Failed`
#[derive(Debug)]
pub struct RunFailure {
    pub stage: StageName,
    /// State the run was in when it aborted
    pub failed_in: OrchestrationState,
    /// `SyncError::EnqueueFailure` or `SyncError::BarrierTimeout`
    pub error: SyncError,
}

/// Result of a run that reached a terminal state
#[derive(Debug)]
pub struct OrchestrationOutcome {
    pub run_id: Uuid,
    pub final_state: OrchestrationState,
    pub transitions: Vec<StateTransition>,
    pub submitted: Vec<JobHandle>,
    pub failure: Option<RunFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OrchestrationOutcome {
    pub fn is_completed(&self) -> bool {
        self.final_state == OrchestrationState::Completed
    }

    pub fn was_skipped(&self) -> bool {
        self.final_state == OrchestrationState::SkippedLocked
    }

    /// States visited in order, starting from `Idle`
    pub fn visited_states(&self) -> Vec<OrchestrationState> {
        let mut states = vec![OrchestrationState::Idle];
        states.extend(self.transitions.iter().map(|t| t.to));
        states
    }

    pub fn submitted_for(&self, stage: &Stage) -> usize {
        self.submitted
            .iter()
            .filter(|handle| stage.contains(handle.job_type))
            .count()
    }
}

/// Mutable bookkeeping for a run in progress
#[derive(Debug)]
struct RunTracker {
    run_id: Uuid,
    state: OrchestrationState,
    transitions: Vec<StateTransition>,
    submitted: Vec<JobHandle>,
    started_at: DateTime<Utc>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: OrchestrationState::Idle,
            transitions: Vec::new(),
            submitted: Vec::new(),
            started_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: OrchestrationState) {
        if !self.state.can_transition_to(next) {
            error!(
                run_id = %self.run_id,
                from = %self.state,
                to = %next,
                "Illegal orchestration transition"
            );
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
    }

    fn finish(self, failure: Option<RunFailure>) -> OrchestrationOutcome {
        OrchestrationOutcome {
            run_id: self.run_id,
            final_state: self.state,
            transitions: self.transitions,
            submitted: self.submitted,
            failure,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

enum StageResult {
    Finished,
    Aborted(RunFailure),
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    lock: DistributedLock,
    barrier: StageBarrier,
    broker: Arc<dyn QueueBroker>,
    plan: StagePlan,
    lock_key: String,
    lock_ttl: Duration,
    wait_for_stage2: bool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        broker: Arc<dyn QueueBroker>,
        config: &StageSyncConfig,
    ) -> Self {
        Self {
            lock: DistributedLock::new(store.clone()),
            barrier: StageBarrier::new(store),
            broker,
            plan: StagePlan::from_config(config),
            lock_key: config.coordination.lock_key.clone(),
            lock_ttl: config.coordination.lock_ttl(),
            wait_for_stage2: config.orchestration.wait_for_stage2,
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    /// Execute one full sync run to a terminal state
    #[instrument(skip(self), fields(lock_key = %self.lock_key))]
    pub async fn run_full_sync(&self) -> Result<OrchestrationOutcome> {
        let mut run = RunTracker::new();
        let run_id = run.run_id.to_string();

        run.transition(OrchestrationState::AcquiringLock);
        let acquired = match self.lock.acquire(&self.lock_key, &run_id, self.lock_ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                log_error("orchestrator", "acquire_lock", &e.to_string(), Some(&run_id));
                run.transition(OrchestrationState::Failed);
                return Err(e);
            }
        };

        if !acquired {
            info!(run_id = %run_id, "⏭️ Sync already running, skipping this trigger");
            run.transition(OrchestrationState::SkippedLocked);
            return Ok(run.finish(None));
        }

        log_orchestration_operation("full_sync", Some(&run_id), None, "started", None);

        let plan = &self.plan;

        run.transition(OrchestrationState::Stage1Enqueue);
        match self
            .execute_stage(&mut run, &plan.core, OrchestrationState::Stage1Wait, true)
            .await
        {
            Ok(StageResult::Finished) => {}
            Ok(StageResult::Aborted(failure)) => {
                return Ok(self.abort(run, &plan.core, failure).await);
            }
            Err(e) => return Err(self.abort_on_store_error(run, &plan.core, e).await),
        }

        run.transition(OrchestrationState::Stage2Enqueue);
        match self
            .execute_stage(
                &mut run,
                &plan.order,
                OrchestrationState::Stage2Wait,
                self.wait_for_stage2,
            )
            .await
        {
            Ok(StageResult::Finished) => {}
            Ok(StageResult::Aborted(failure)) => {
                return Ok(self.abort(run, &plan.order, failure).await);
            }
            Err(e) => return Err(self.abort_on_store_error(run, &plan.order, e).await),
        }

        self.lock.release(&self.lock_key).await;
        run.transition(OrchestrationState::Completed);

        let details = format!("submitted {} jobs", run.submitted.len());
        log_orchestration_operation("full_sync", Some(&run_id), None, "completed", Some(&details));
        info!(run_id = %run_id, "🎉 Full sync completed");

        Ok(run.finish(None))
    }

    /// Submit every job of `stage` and, when `wait` is set, block on its barrier.
    ///
    /// The barrier is initialized before the first submission so that no signal
    /// can arrive ahead of it.
    async fn execute_stage(
        &self,
        run: &mut RunTracker,
        stage: &Stage,
        wait_state: OrchestrationState,
        wait: bool,
    ) -> Result<StageResult> {
        if wait {
            self.barrier
                .init(&stage.barrier_key, stage.target_count())
                .await?;
        }

        for &job_type in &stage.job_types {
            match self.broker.enqueue(job_type).await {
                Ok(handle) => run.submitted.push(handle),
                Err(e) => {
                    warn!(
                        run_id = %run.run_id,
                        stage = %stage.name,
                        job_type = %job_type,
                        error = %e,
                        "❌ Failed to enqueue stage job"
                    );
                    return Ok(StageResult::Aborted(RunFailure {
                        stage: stage.name,
                        failed_in: run.state,
                        error: SyncError::EnqueueFailure {
                            stage: stage.name,
                            job_type,
                            message: e.to_string(),
                        },
                    }));
                }
            }
        }

        log_orchestration_operation(
            "enqueue_stage",
            Some(&run.run_id.to_string()),
            Some(stage.name.as_str()),
            "submitted",
            Some(&format!("{} jobs", stage.job_types.len())),
        );

        if !wait {
            info!(
                run_id = %run.run_id,
                stage = %stage.name,
                "Stage submitted, not waiting for completion"
            );
            return Ok(StageResult::Finished);
        }

        run.transition(wait_state);
        let outcome = self
            .barrier
            .wait(&stage.barrier_key, stage.poll_interval, stage.wait_timeout)
            .await?;

        match outcome {
            BarrierWaitOutcome::Done => {
                self.barrier.cleanup(&stage.barrier_key).await?;
                log_orchestration_operation(
                    "wait_stage",
                    Some(&run.run_id.to_string()),
                    Some(stage.name.as_str()),
                    "done",
                    None,
                );
                Ok(StageResult::Finished)
            }
            BarrierWaitOutcome::TimedOut => Ok(StageResult::Aborted(RunFailure {
                stage: stage.name,
                failed_in: run.state,
                error: SyncError::BarrierTimeout {
                    stage: stage.name,
                    timeout: stage.wait_timeout,
                },
            })),
        }
    }

    async fn abort(
        &self,
        mut run: RunTracker,
        stage: &Stage,
        failure: RunFailure,
    ) -> OrchestrationOutcome {
        self.release_after_abort(&run, stage).await;
        run.transition(OrchestrationState::Failed);

        log_error(
            "orchestrator",
            "full_sync",
            &failure.error.to_string(),
            Some(&run.run_id.to_string()),
        );
        run.finish(Some(failure))
    }

    async fn abort_on_store_error(
        &self,
        mut run: RunTracker,
        stage: &Stage,
        error: SyncError,
    ) -> SyncError {
        log_error(
            "orchestrator",
            "full_sync",
            &error.to_string(),
            Some(&run.run_id.to_string()),
        );
        self.release_after_abort(&run, stage).await;
        run.transition(OrchestrationState::Failed);
        error
    }

    async fn release_after_abort(&self, run: &RunTracker, stage: &Stage) {
        if let Err(e) = self.barrier.cleanup(&stage.barrier_key).await {
            warn!(
                run_id = %run.run_id,
                barrier_key = %stage.barrier_key,
                error = %e,
                "Failed to delete stage barrier during abort"
            );
        }
        self.lock.release(&self.lock_key).await;
    }
}
