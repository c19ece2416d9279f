//! # StageSync Worker
//!
//! Runs the scheduler and a job worker against PostgreSQL-backed coordination
//! and a pgmq queue until Ctrl-C.
//!
//! Stage jobs in this binary are handled by a placeholder that logs and
//! succeeds; applications embedding the library register their own
//! [`SyncJobHandler`] implementations for the stage job types.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use stagesync_core::config::ConfigManager;
use stagesync_core::constants::JobType;
use stagesync_core::coordination::PgCoordinationStore;
use stagesync_core::logging::init_structured_logging;
use stagesync_core::messaging::PgmqQueueBroker;
use stagesync_core::orchestration::{OrchestrationScheduler, Orchestrator};
use stagesync_core::worker::{
    HandlerRegistry, JobContext, JobError, OrchestrateFullSyncHandler, SyncJobHandler, SyncWorker,
};

#[derive(Parser)]
#[command(name = "stagesync-worker")]
#[command(about = "Run the staged sync scheduler and worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: $STAGESYNC_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Do not submit scheduled full sync jobs; only consume jobs
    #[arg(long)]
    no_scheduler: bool,

    /// Perform a single full sync run in this process and exit
    #[arg(long)]
    run_once: bool,
}

#[derive(Debug)]
struct PlaceholderStageHandler(JobType);

#[async_trait]
impl SyncJobHandler for PlaceholderStageHandler {
    fn job_type(&self) -> JobType {
        self.0
    }

    async fn handle(&self, context: &JobContext) -> Result<(), JobError> {
        info!(
            job_type = %context.job_type,
            job_id = %context.job_id,
            attempt = context.attempt,
            "Stage job received by placeholder handler"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let manager =
        ConfigManager::load_or_default(cli.config_dir).context("failed to load configuration")?;
    let config = manager.config();
    info!(
        environment = %manager.environment(),
        config = %manager.debug_config(),
        "⚙️ Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.database_url())
        .await
        .context("failed to connect to PostgreSQL")?;

    let store = Arc::new(PgCoordinationStore::new(pool.clone()));
    store.ensure_schema().await?;

    let broker = Arc::new(PgmqQueueBroker::new_with_pool(pool.clone(), &config.queue).await);
    broker.ensure_queue().await?;

    let orchestrator = Arc::new(Orchestrator::new(store.clone(), broker.clone(), config));

    if cli.run_once {
        let outcome = orchestrator.run_full_sync().await?;
        info!(
            run_id = %outcome.run_id,
            final_state = %outcome.final_state,
            submitted = outcome.submitted.len(),
            "Single run finished"
        );
        if let Some(failure) = outcome.failure {
            anyhow::bail!("full sync failed in stage {}: {}", failure.stage, failure.error);
        }
        return Ok(());
    }

    let registry = Arc::new(HandlerRegistry::new());
    registry.register(Arc::new(OrchestrateFullSyncHandler::new(orchestrator)))?;
    for job_type in config.all_stage_jobs() {
        registry.register(Arc::new(PlaceholderStageHandler(job_type)))?;
    }

    let (shutdown_tx, _) = broadcast::channel(4);

    let scheduler = (!cli.no_scheduler).then(|| {
        OrchestrationScheduler::new(broker.clone(), &config.orchestration)
            .spawn(shutdown_tx.subscribe())
    });

    let worker = Arc::new(SyncWorker::new(broker, registry, store, config));
    let worker_handle = worker.spawn(shutdown_tx.subscribe());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("🛑 Shutdown requested");
    if shutdown_tx.send(()).is_err() {
        error!("No running components received the shutdown signal");
    }

    if let Some(scheduler) = scheduler {
        let submitted = scheduler.await?;
        info!(submitted, "Scheduler finished");
    }
    let stats = worker_handle.await?;
    info!(processed = stats.processed, "Worker finished");

    pool.close().await;
    Ok(())
}
