//! # Messaging Module
//!
//! Queue broker adapters for sync jobs. The orchestrator submits through
//! [`QueueBroker`]; workers consume through [`JobSource`].

pub mod broker;
pub mod in_memory;
pub mod message;
pub mod pgmq_broker;

pub use broker::{JobSource, QueueBroker};
pub use in_memory::InMemoryQueueBroker;
pub use message::{Delivery, JobHandle, SyncJobMessage};
pub use pgmq_broker::PgmqQueueBroker;
