//! # Sync Worker
//!
//! Pulls jobs from a [`JobSource`], dispatches them to registered handlers with
//! bounded concurrency, and settles each delivery with the broker according to
//! its [`JobDisposition`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::completion::{run_with_completion_signal, CompletionReport, JobDisposition};
use super::handler::JobContext;
use super::registry::HandlerRegistry;
use crate::config::StageSyncConfig;
use crate::coordination::{CoordinationStore, StageBarrier};
use crate::error::Result;
use crate::messaging::{Delivery, JobSource};
use crate::orchestration::StagePlan;

#[derive(Debug, Default)]
struct WorkerCounters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed_permanently: AtomicU64,
}

/// Snapshot of a worker's job counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed_permanently: u64,
}

#[derive(Debug)]
pub struct SyncWorker {
    worker_id: Uuid,
    source: Arc<dyn JobSource>,
    registry: Arc<HandlerRegistry>,
    barrier: StageBarrier,
    plan: StagePlan,
    semaphore: Arc<Semaphore>,
    batch_size: u32,
    polling_interval: Duration,
    counters: WorkerCounters,
}

impl SyncWorker {
    pub fn new(
        source: Arc<dyn JobSource>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn CoordinationStore>,
        config: &StageSyncConfig,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            source,
            registry,
            barrier: StageBarrier::new(store),
            plan: StagePlan::from_config(config),
            semaphore: Arc::new(Semaphore::new(config.queue.concurrency)),
            batch_size: config.queue.batch_size,
            polling_interval: config.queue.polling_interval(),
            counters: WorkerCounters::default(),
        }
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed_permanently: self.counters.failed_permanently.load(Ordering::Relaxed),
        }
    }

    /// Handle one delivery and settle it with the broker
    #[instrument(skip(self, delivery), fields(job_type = %delivery.job_type(), attempt = delivery.attempt))]
    pub async fn process_delivery(&self, delivery: Delivery) -> CompletionReport {
        let context = JobContext::from_delivery(&delivery);
        let handler = self.registry.get(context.job_type);

        let report = run_with_completion_signal(&self.barrier, &self.plan, handler, &context).await;

        let settled = match report.disposition {
            JobDisposition::Succeeded => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.source.complete(&delivery).await
            }
            JobDisposition::RetryScheduled => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                self.source.retry_later(&delivery).await
            }
            JobDisposition::FailedPermanently => {
                self.counters.failed_permanently.fetch_add(1, Ordering::Relaxed);
                self.source.fail_permanently(&delivery).await
            }
        };
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = settled {
            error!(
                message_id = delivery.message_id,
                disposition = ?report.disposition,
                error = %e,
                "❌ Failed to settle job with broker"
            );
        }

        report
    }

    /// Receive one batch and process it to completion. Returns the number of
    /// jobs handled.
    pub async fn poll_once(self: &Arc<Self>) -> Result<usize> {
        let deliveries = self.source.receive(self.batch_size).await?;
        let count = deliveries.len();

        let mut tasks = JoinSet::new();
        for delivery in deliveries {
            self.spawn_delivery(&mut tasks, delivery).await;
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task aborted");
            }
        }

        Ok(count)
    }

    /// Poll until `shutdown` fires, then wait for in-flight jobs
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        info!(
            worker_id = %self.worker_id,
            batch_size = self.batch_size,
            polling_interval_ms = self.polling_interval.as_millis() as u64,
            "🚀 Starting sync worker"
        );

        let mut tasks = JoinSet::new();

        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Job task aborted");
                }
            }

            let available = self.semaphore.available_permits() as u32;
            let fetched = if available == 0 {
                0
            } else {
                match self.source.receive(available.min(self.batch_size)).await {
                    Ok(deliveries) => {
                        let count = deliveries.len();
                        for delivery in deliveries {
                            self.spawn_delivery(&mut tasks, delivery).await;
                        }
                        count
                    }
                    Err(e) => {
                        error!(worker_id = %self.worker_id, error = %e, "Failed to receive jobs");
                        0
                    }
                }
            };

            if fetched > 0 {
                debug!(worker_id = %self.worker_id, fetched, "📨 Dispatched jobs");
                if shutdown_requested(&mut shutdown) {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.polling_interval) => {},
                _ = shutdown.recv() => {
                    debug!("Shutdown signal received by worker");
                    break;
                }
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(worker_id = %self.worker_id, in_flight, "Draining in-flight jobs");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task aborted");
            }
        }

        let stats = self.stats();
        info!(
            worker_id = %self.worker_id,
            processed = stats.processed,
            succeeded = stats.succeeded,
            retried = stats.retried,
            failed_permanently = stats.failed_permanently,
            "🛑 Sync worker stopped"
        );
        stats
    }

    pub fn spawn(
        self: Arc<Self>,
        shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<WorkerStats> {
        tokio::spawn(self.run(shutdown))
    }

    async fn spawn_delivery(self: &Arc<Self>, tasks: &mut JoinSet<()>, delivery: Delivery) {
        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            error!("Worker semaphore closed, dropping delivery");
            return;
        };
        let worker = Arc::clone(self);
        tasks.spawn(async move {
            worker.process_delivery(delivery).await;
            drop(permit);
        });
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::JobType;
    use crate::coordination::InMemoryCoordinationStore;
    use crate::messaging::{InMemoryQueueBroker, QueueBroker};
    use crate::worker::handler::{JobError, SyncJobHandler};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct OkHandler(JobType);

    #[async_trait]
    impl SyncJobHandler for OkHandler {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn handle(&self, _context: &JobContext) -> std::result::Result<(), JobError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_poll_once_signals_core_barrier() {
        let config = StageSyncConfig::default();
        let store = Arc::new(InMemoryCoordinationStore::new());
        let broker = Arc::new(InMemoryQueueBroker::default());
        let registry = Arc::new(HandlerRegistry::new());
        for &job_type in &config.stages.core.jobs {
            registry.register(Arc::new(OkHandler(job_type))).unwrap();
            broker.enqueue(job_type).await.unwrap();
        }
        StageBarrier::new(store.clone())
            .init("core_tasks_remaining", 4)
            .await
            .unwrap();

        let worker = Arc::new(SyncWorker::new(broker.clone(), registry, store.clone(), &config));
        assert_eq!(worker.poll_once().await.unwrap(), 4);

        assert_eq!(store.get_counter("core_tasks_remaining").await.unwrap(), Some(0));
        assert_eq!(worker.stats().succeeded, 4);
        assert_eq!(broker.in_flight_count(), 0);
    }
}
