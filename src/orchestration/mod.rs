//! # Orchestration
//!
//! The staged full-sync pipeline: stage definitions, the run state machine, the
//! orchestrator that drives it, and the recurring trigger.
//!
//! ## Pipeline
//!
//! ```text
//! acquire sync_running ──► core stage (products, customers, pricelists,
//!                          customer statements) ──► barrier core_tasks_remaining
//!                      ──► order stage (orders, invoices and lines)
//!                          ──► barrier order_tasks_remaining ──► release lock
//! ```

pub mod orchestrator;
pub mod scheduler;
pub mod stage;
pub mod states;

pub use orchestrator::{OrchestrationOutcome, Orchestrator, RunFailure, StateTransition};
pub use scheduler::OrchestrationScheduler;
pub use stage::{Stage, StageName, StagePlan};
pub use states::OrchestrationState;
