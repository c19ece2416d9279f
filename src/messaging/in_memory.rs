//! Single-process broker with explicit redelivery, used for local runs and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::broker::{JobSource, QueueBroker};
use super::message::{Delivery, JobHandle, SyncJobMessage};
use crate::constants::{defaults, JobType};
use crate::error::Result;

#[derive(Debug, Default)]
struct QueueState {
    next_message_id: i64,
    ready: VecDeque<(i64, SyncJobMessage, u32)>,
    in_flight: HashMap<i64, (SyncJobMessage, u32)>,
    archived: Vec<SyncJobMessage>,
    submitted: Vec<JobType>,
}

#[derive(Debug)]
pub struct InMemoryQueueBroker {
    queue_name: String,
    max_retries: u32,
    state: Mutex<QueueState>,
}

impl Default for InMemoryQueueBroker {
    fn default() -> Self {
        Self::new(defaults::QUEUE_NAME, defaults::MAX_RETRIES)
    }
}

impl InMemoryQueueBroker {
    pub fn new(queue_name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_retries,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Every job type submitted so far, in submission order
    pub fn submitted(&self) -> Vec<JobType> {
        self.state.lock().submitted.clone()
    }

    /// Jobs waiting for delivery
    pub fn ready_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Jobs that exhausted their retries
    pub fn archived(&self) -> Vec<SyncJobMessage> {
        self.state.lock().archived.clone()
    }
}

#[async_trait]
impl QueueBroker for InMemoryQueueBroker {
    async fn enqueue(&self, job_type: JobType) -> Result<JobHandle> {
        let message = SyncJobMessage::new(job_type, self.max_retries);
        let mut state = self.state.lock();
        state.next_message_id += 1;
        let message_id = state.next_message_id;

        let handle = JobHandle {
            job_id: message.job_id,
            job_type,
            message_id,
            queue_name: self.queue_name.clone(),
        };
        state.ready.push_back((message_id, message, 0));
        state.submitted.push(job_type);

        debug!(queue = %self.queue_name, job_type = %job_type, message_id, "📤 Job enqueued");
        Ok(handle)
    }
}

#[async_trait]
impl JobSource for InMemoryQueueBroker {
    async fn receive(&self, limit: u32) -> Result<Vec<Delivery>> {
        let mut state = self.state.lock();
        let mut deliveries = Vec::new();

        while deliveries.len() < limit as usize {
            let Some((message_id, message, read_ct)) = state.ready.pop_front() else {
                break;
            };
            let attempt = read_ct + 1;
            state.in_flight.insert(message_id, (message.clone(), attempt));
            deliveries.push(Delivery {
                message_id,
                message,
                attempt,
            });
        }

        Ok(deliveries)
    }

    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().in_flight.remove(&delivery.message_id);
        Ok(())
    }

    async fn retry_later(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((message, attempt)) = state.in_flight.remove(&delivery.message_id) {
            state.ready.push_back((delivery.message_id, message, attempt));
        }
        Ok(())
    }

    async fn fail_permanently(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((message, _)) = state.in_flight.remove(&delivery.message_id) {
            state.archived.push(message);
        }
        Ok(())
    }
}
