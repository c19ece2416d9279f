//! Completion signalling around stage job handlers.
//!
//! A stage job decrements its stage barrier exactly once, on the attempt that
//! ends it: a success, or a failure with no retries left. Panics count as
//! failures. Attempts that will be retried leave the barrier alone, so a job
//! that fails twice and then succeeds signals once.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use super::handler::{JobContext, JobError, SyncJobHandler};
use crate::coordination::{SignalOutcome, StageBarrier};
use crate::logging::{log_error, log_job_operation};
use crate::orchestration::StagePlan;

/// What the broker should do with the job after this attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Succeeded,
    RetryScheduled,
    FailedPermanently,
}

impl JobDisposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RetryScheduled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub disposition: JobDisposition,
    /// Barrier signal result; `None` when no signal was sent
    pub signal: Option<SignalOutcome>,
    pub error: Option<JobError>,
}

/// Run `handler` for one attempt and signal the job's stage barrier if the
/// attempt is terminal.
///
/// A missing handler is a terminal failure. Jobs outside every stage (the
/// orchestrate job) never signal.
pub async fn run_with_completion_signal(
    barrier: &StageBarrier,
    plan: &StagePlan,
    handler: Option<Arc<dyn SyncJobHandler>>,
    context: &JobContext,
) -> CompletionReport {
    let result = match handler {
        Some(handler) => AssertUnwindSafe(handler.handle(context))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic)))),
        None => Err(JobError::NoHandler(context.job_type)),
    };

    let disposition = match &result {
        Ok(()) => JobDisposition::Succeeded,
        Err(JobError::NoHandler(_)) => JobDisposition::FailedPermanently,
        Err(_) if context.is_final_attempt() => JobDisposition::FailedPermanently,
        Err(_) => JobDisposition::RetryScheduled,
    };

    let job_id = context.job_id.to_string();
    let error = result.err();
    let status = match disposition {
        JobDisposition::Succeeded => "succeeded",
        JobDisposition::RetryScheduled => "retry_scheduled",
        JobDisposition::FailedPermanently => "failed_permanently",
    };
    let details = error.as_ref().map(ToString::to_string);
    log_job_operation(
        "handle",
        context.job_type.as_str(),
        Some(&job_id),
        Some(context.attempt),
        status,
        details.as_deref(),
    );

    let signal = if disposition.is_terminal() {
        signal_stage(barrier, plan, context).await
    } else {
        debug!(
            job_type = %context.job_type,
            attempt = context.attempt,
            max_retries = context.max_retries,
            "Retry pending, barrier not signalled"
        );
        None
    };

    CompletionReport {
        disposition,
        signal,
        error,
    }
}

async fn signal_stage(
    barrier: &StageBarrier,
    plan: &StagePlan,
    context: &JobContext,
) -> Option<SignalOutcome> {
    let stage = plan.stage_for(context.job_type)?;

    match barrier.signal(&stage.barrier_key).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            log_error(
                "completion_signal",
                "signal",
                &e.to_string(),
                Some(stage.barrier_key.as_str()),
            );
            warn!(
                job_type = %context.job_type,
                stage = %stage.name,
                "⚠️ Completion signal lost, stage will wait until its timeout"
            );
            None
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
