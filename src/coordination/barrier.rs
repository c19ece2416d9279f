//! # Stage Barrier
//!
//! Countdown barrier per stage. The orchestrator initializes the counter to the
//! number of jobs it is about to enqueue and then polls it; each job decrements
//! it once on terminal completion.
//!
//! An absent key reads as finished: a fully signalled counter may be cleaned up
//! between the last signal and the next poll, and a late signal against a deleted
//! counter is a no-op.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use super::{CoordinationStore, CounterDecrement};
use crate::error::Result;

/// Result of waiting on a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWaitOutcome {
    Done,
    TimedOut,
}

/// Result of a single completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Counter was decremented to this value
    Remaining(i64),
    /// Counter was already zero; a second signal from the same stage
    AlreadyZero,
    /// No live counter; the stage finished, timed out, or never waited
    Missing,
}

#[derive(Debug, Clone)]
pub struct StageBarrier {
    store: Arc<dyn CoordinationStore>,
}

impl StageBarrier {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Set the counter to `count`, overwriting anything left by an abandoned stage
    #[instrument(skip(self))]
    pub async fn init(&self, key: &str, count: i64) -> Result<()> {
        self.store.set_counter(key, count).await?;
        info!(barrier_key = %key, count, "🚧 Stage barrier initialized");
        Ok(())
    }

    /// Decrement the counter once, never below zero
    #[instrument(skip(self))]
    pub async fn signal(&self, key: &str) -> Result<SignalOutcome> {
        let outcome = match self.store.decrement_counter(key).await? {
            CounterDecrement::Decremented(remaining) => {
                info!(barrier_key = %key, remaining, "📊 Stage tasks remaining");
                SignalOutcome::Remaining(remaining)
            }
            CounterDecrement::AtZero => {
                warn!(
                    barrier_key = %key,
                    "⚠️ Barrier already at zero, a job signalled more than once"
                );
                SignalOutcome::AlreadyZero
            }
            CounterDecrement::Missing => {
                debug!(barrier_key = %key, "Barrier key absent, signal ignored");
                SignalOutcome::Missing
            }
        };
        Ok(outcome)
    }

    /// Poll the counter every `poll_interval` until it reaches zero, disappears,
    /// or `timeout` has elapsed. The last poll lands on the deadline.
    #[instrument(skip(self))]
    pub async fn wait(
        &self,
        key: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<BarrierWaitOutcome> {
        let started = Instant::now();

        loop {
            match self.store.get_counter(key).await? {
                None => {
                    debug!(barrier_key = %key, "Barrier key absent, treating stage as done");
                    return Ok(BarrierWaitOutcome::Done);
                }
                Some(remaining) if remaining <= 0 => {
                    info!(
                        barrier_key = %key,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "✅ Stage barrier reached zero"
                    );
                    return Ok(BarrierWaitOutcome::Done);
                }
                Some(remaining) => {
                    trace!(barrier_key = %key, remaining, "Waiting on stage barrier");
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(
                    barrier_key = %key,
                    timeout_seconds = timeout.as_secs(),
                    "❌ Timed out waiting on stage barrier"
                );
                return Ok(BarrierWaitOutcome::TimedOut);
            }

            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Delete the counter after the stage is over
    #[instrument(skip(self))]
    pub async fn cleanup(&self, key: &str) -> Result<()> {
        self.store.delete(key).await?;
        debug!(barrier_key = %key, "Stage barrier cleaned up");
        Ok(())
    }

    /// Current counter value, if live
    pub async fn remaining(&self, key: &str) -> Result<Option<i64>> {
        self.store.get_counter(key).await
    }
}
