//! # Coordination Module
//!
//! Cross-process coordination primitives built on a shared key-value store.
//!
//! ## Architecture
//!
//! - **CoordinationStore**: the only shared dependency between orchestrator and
//!   workers. Every mutation is one atomic store operation.
//! - **DistributedLock**: at-most-one active orchestration run, fleet-wide.
//! - **StageBarrier**: countdown counter per stage, polled by the orchestrator
//!   and decremented by job handlers on terminal completion.
//!
//! Two stores ship: [`PgCoordinationStore`] for fleets sharing a PostgreSQL
//! database and [`InMemoryCoordinationStore`] for single-process runs and tests.

pub mod barrier;
pub mod lock;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use barrier::{BarrierWaitOutcome, SignalOutcome, StageBarrier};
pub use lock::DistributedLock;
pub use memory::InMemoryCoordinationStore;
pub use postgres::PgCoordinationStore;

/// Result of an atomic counter decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDecrement {
    /// Counter was positive and now holds this value
    Decremented(i64),
    /// Counter exists but is already at or below zero; left untouched
    AtZero,
    /// Key is absent or expired
    Missing,
}

/// Atomic key-value operations shared by lock and barrier
#[async_trait]
pub trait CoordinationStore: Send + Sync + std::fmt::Debug {
    /// Create `key` holding `value` with the given expiry, only if absent or expired.
    /// Returns true iff this call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Unconditionally set `key` to a counter value with no expiry
    async fn set_counter(&self, key: &str, value: i64) -> Result<()>;

    /// Atomically decrement a positive counter, never going below zero
    async fn decrement_counter(&self, key: &str) -> Result<CounterDecrement>;

    /// Read a counter; `None` when absent or expired
    async fn get_counter(&self, key: &str) -> Result<Option<i64>>;

    /// Read a plain value; `None` when absent or expired
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key`. Returns true if something was removed
    async fn delete(&self, key: &str) -> Result<bool>;
}
