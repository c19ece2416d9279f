#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # StageSync Core
//!
//! Staged-sync orchestration coordinator: one periodic full sync at a time,
//! executed as two ordered stages of parallel jobs on a shared job queue.
//!
//! ## Overview
//!
//! A full sync imports master data (products, customers, pricelists, customer
//! statements) before the data that references it (orders, invoices and lines).
//! Jobs of a stage run in parallel on any number of workers; the next stage
//! starts only after every job of the previous stage has finished.
//!
//! ## Architecture
//!
//! - **Distributed lock** (`sync_running`): at most one run fleet-wide.
//! - **Stage barriers** (`core_tasks_remaining`, `order_tasks_remaining`):
//!   countdown counters the orchestrator polls and jobs decrement once.
//! - **Queue broker**: pgmq in production, in-memory for local runs and tests.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`coordination`] - Coordination store, lock, and barrier
//! - [`messaging`] - Queue broker adapters
//! - [`orchestration`] - Run state machine, orchestrator, and scheduler
//! - [`worker`] - Handler registry, completion signalling, and the worker loop
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stagesync_core::config::StageSyncConfig;
//! use stagesync_core::coordination::InMemoryCoordinationStore;
//! use stagesync_core::messaging::InMemoryQueueBroker;
//! use stagesync_core::orchestration::Orchestrator;
//!
//! # async fn example() -> stagesync_core::Result<()> {
//! let config = StageSyncConfig::default();
//! let store = Arc::new(InMemoryCoordinationStore::new());
//! let broker = Arc::new(InMemoryQueueBroker::default());
//!
//! let orchestrator = Orchestrator::new(store, broker, &config);
//! let outcome = orchestrator.run_full_sync().await?;
//! println!("run {} ended as {}", outcome.run_id, outcome.final_state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod worker;

pub use config::{ConfigManager, StageSyncConfig};
pub use constants::JobType;
pub use coordination::{
    BarrierWaitOutcome, CoordinationStore, DistributedLock, InMemoryCoordinationStore,
    PgCoordinationStore, SignalOutcome, StageBarrier,
};
pub use error::{Result, SyncError};
pub use messaging::{InMemoryQueueBroker, JobSource, PgmqQueueBroker, QueueBroker};
pub use orchestration::{
    OrchestrationOutcome, OrchestrationScheduler, OrchestrationState, Orchestrator, StageName,
};
pub use worker::{HandlerRegistry, OrchestrateFullSyncHandler, SyncJobHandler, SyncWorker};
