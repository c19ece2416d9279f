//! Test doubles for the broker and coordination store seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagesync_core::coordination::{
    CoordinationStore, CounterDecrement, InMemoryCoordinationStore, StageBarrier,
};
use stagesync_core::messaging::{InMemoryQueueBroker, JobHandle, QueueBroker};
use stagesync_core::orchestration::StagePlan;
use stagesync_core::worker::{JobContext, JobError, SyncJobHandler};
use stagesync_core::{JobType, Result, SyncError};

/// Ordered record of what happened during a simulated run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    Enqueued(JobType),
    Signalled(JobType),
}

/// Broker whose submissions fail for one job type
#[derive(Debug)]
pub struct FailingBroker {
    inner: InMemoryQueueBroker,
    fail_on: JobType,
}

impl FailingBroker {
    pub fn failing_on(job_type: JobType) -> Self {
        Self {
            inner: InMemoryQueueBroker::default(),
            fail_on: job_type,
        }
    }

    pub fn submitted(&self) -> Vec<JobType> {
        self.inner.submitted()
    }
}

#[async_trait]
impl QueueBroker for FailingBroker {
    async fn enqueue(&self, job_type: JobType) -> Result<JobHandle> {
        if job_type == self.fail_on {
            return Err(SyncError::queue_operation(
                "stagesync_jobs",
                "send",
                "broker rejected submission",
            ));
        }
        self.inner.enqueue(job_type).await
    }
}

/// Broker standing in for a worker fleet: every submitted stage job signals its
/// barrier after a per-job delay, unless it is marked as silent.
#[derive(Debug)]
pub struct SignallingBroker {
    inner: InMemoryQueueBroker,
    barrier: StageBarrier,
    plan: StagePlan,
    delays: HashMap<JobType, Duration>,
    default_delay: Duration,
    silent: HashSet<JobType>,
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl SignallingBroker {
    pub fn new(store: Arc<dyn CoordinationStore>, plan: StagePlan) -> Self {
        Self {
            inner: InMemoryQueueBroker::default(),
            barrier: StageBarrier::new(store),
            plan,
            delays: HashMap::new(),
            default_delay: Duration::from_secs(1),
            silent: HashSet::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, job_type: JobType, delay: Duration) -> Self {
        self.delays.insert(job_type, delay);
        self
    }

    /// The job runs but never signals, like a worker that crashed mid-job
    pub fn with_silent(mut self, job_type: JobType) -> Self {
        self.silent.insert(job_type);
        self
    }

    pub fn submitted(&self) -> Vec<JobType> {
        self.inner.submitted()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn signalled(&self) -> Vec<JobType> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::Signalled(job_type) => Some(job_type),
                PipelineEvent::Enqueued(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl QueueBroker for SignallingBroker {
    async fn enqueue(&self, job_type: JobType) -> Result<JobHandle> {
        let handle = self.inner.enqueue(job_type).await?;
        self.events.lock().push(PipelineEvent::Enqueued(job_type));

        if self.silent.contains(&job_type) {
            return Ok(handle);
        }
        if let Some(stage) = self.plan.stage_for(job_type) {
            let barrier = self.barrier.clone();
            let key = stage.barrier_key.clone();
            let delay = self
                .delays
                .get(&job_type)
                .copied()
                .unwrap_or(self.default_delay);
            let events = Arc::clone(&self.events);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                barrier.signal(&key).await.expect("signal failed");
                events.lock().push(PipelineEvent::Signalled(job_type));
            });
        }
        Ok(handle)
    }
}

/// In-memory store whose counter reads can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryCoordinationStore,
    fail_counter_reads: AtomicBool,
}

impl FlakyStore {
    pub fn fail_counter_reads(&self) {
        self.fail_counter_reads.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryCoordinationStore {
        &self.inner
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.inner.set_counter(key, value).await
    }

    async fn decrement_counter(&self, key: &str) -> Result<CounterDecrement> {
        self.inner.decrement_counter(key).await
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>> {
        if self.fail_counter_reads.load(Ordering::SeqCst) {
            return Err(SyncError::store_unavailable("get_counter", "connection reset"));
        }
        self.inner.get_counter(key).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_value(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }
}

/// How a [`ScriptedHandler`] behaves on each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Fail this many attempts, then succeed
    FailTimes(u32),
    AlwaysFail,
    Panic,
}

#[derive(Debug)]
pub struct ScriptedHandler {
    job_type: JobType,
    behavior: Behavior,
    attempts: AtomicU32,
}

impl ScriptedHandler {
    pub fn new(job_type: JobType, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            behavior,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncJobHandler for ScriptedHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, _context: &JobContext) -> std::result::Result<(), JobError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailTimes(times) if attempt <= times => {
                Err(JobError::failed(format!("attempt {attempt} failed")))
            }
            Behavior::FailTimes(_) => Ok(()),
            Behavior::AlwaysFail => Err(JobError::failed("upstream unavailable")),
            Behavior::Panic => panic!("handler exploded on attempt {attempt}"),
        }
    }
}
