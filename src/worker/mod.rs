//! # Worker
//!
//! Consumer side of the job queue: handler registry, the completion-signal
//! wrapper that ties stage jobs to their barriers, and the polling worker.

pub mod completion;
pub mod handler;
pub mod orchestrate_handler;
pub mod registry;
pub mod sync_worker;

pub use completion::{run_with_completion_signal, CompletionReport, JobDisposition};
pub use handler::{JobContext, JobError, SyncJobHandler};
pub use orchestrate_handler::OrchestrateFullSyncHandler;
pub use registry::HandlerRegistry;
pub use sync_worker::{SyncWorker, WorkerStats};
