mod common;

use common::{Behavior, ScriptedHandler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use stagesync_core::constants::{keys, JobType};
use stagesync_core::coordination::{CoordinationStore, InMemoryCoordinationStore, StageBarrier};
use stagesync_core::messaging::{InMemoryQueueBroker, QueueBroker};
use stagesync_core::orchestration::{OrchestrationState, Orchestrator};
use stagesync_core::worker::{HandlerRegistry, OrchestrateFullSyncHandler, SyncWorker};

struct Harness {
    store: Arc<InMemoryCoordinationStore>,
    broker: Arc<InMemoryQueueBroker>,
    registry: Arc<HandlerRegistry>,
    worker: Arc<SyncWorker>,
}

fn harness() -> Harness {
    let config = common::test_config();
    let store = common::store();
    let broker = Arc::new(InMemoryQueueBroker::new("stagesync_jobs", 3));
    let registry = Arc::new(HandlerRegistry::new());
    let worker = Arc::new(SyncWorker::new(
        broker.clone(),
        registry.clone(),
        store.clone(),
        &config,
    ));
    Harness {
        store,
        broker,
        registry,
        worker,
    }
}

async fn drain(harness: &Harness) {
    while harness.worker.poll_once().await.unwrap() > 0 {}
}

#[tokio::test]
async fn test_retried_job_signals_once_after_success() {
    let h = harness();
    let handler = ScriptedHandler::new(JobType::Products, Behavior::FailTimes(2));
    h.registry.register(handler.clone()).unwrap();
    StageBarrier::new(h.store.clone())
        .init(keys::CORE_TASKS_REMAINING, 4)
        .await
        .unwrap();
    h.broker.enqueue(JobType::Products).await.unwrap();

    assert_eq!(h.worker.poll_once().await.unwrap(), 1);
    assert_eq!(
        h.store.get_counter(keys::CORE_TASKS_REMAINING).await.unwrap(),
        Some(4)
    );

    drain(&h).await;

    assert_eq!(handler.attempts(), 3);
    assert_eq!(
        h.store.get_counter(keys::CORE_TASKS_REMAINING).await.unwrap(),
        Some(3)
    );
    let stats = h.worker.stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(h.broker.in_flight_count(), 0);
}

#[tokio::test]
async fn test_exhausted_job_signals_once_and_is_archived() {
    let h = harness();
    let handler = ScriptedHandler::new(JobType::Orders, Behavior::AlwaysFail);
    h.registry.register(handler.clone()).unwrap();
    StageBarrier::new(h.store.clone())
        .init(keys::ORDER_TASKS_REMAINING, 2)
        .await
        .unwrap();
    h.broker.enqueue(JobType::Orders).await.unwrap();

    drain(&h).await;

    assert_eq!(handler.attempts(), 4);
    assert_eq!(
        h.store.get_counter(keys::ORDER_TASKS_REMAINING).await.unwrap(),
        Some(1)
    );
    assert_eq!(h.broker.archived().len(), 1);
    assert_eq!(h.worker.stats().failed_permanently, 1);
}

#[tokio::test]
async fn test_panicking_handler_still_signals_on_final_attempt() {
    let h = harness();
    let handler = ScriptedHandler::new(JobType::Customers, Behavior::Panic);
    h.registry.register(handler.clone()).unwrap();
    StageBarrier::new(h.store.clone())
        .init(keys::CORE_TASKS_REMAINING, 1)
        .await
        .unwrap();
    h.broker.enqueue(JobType::Customers).await.unwrap();

    drain(&h).await;

    assert_eq!(handler.attempts(), 4);
    assert_eq!(
        h.store.get_counter(keys::CORE_TASKS_REMAINING).await.unwrap(),
        Some(0)
    );
}

#[tokio::test]
async fn test_unhandled_stage_job_signals_immediately() {
    let h = harness();
    StageBarrier::new(h.store.clone())
        .init(keys::CORE_TASKS_REMAINING, 4)
        .await
        .unwrap();
    h.broker.enqueue(JobType::Pricelists).await.unwrap();

    assert_eq!(h.worker.poll_once().await.unwrap(), 1);

    assert_eq!(
        h.store.get_counter(keys::CORE_TASKS_REMAINING).await.unwrap(),
        Some(3)
    );
    assert_eq!(h.broker.archived().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_worker_fleet_completes_full_pipeline() {
    let config = common::test_config();
    let h = harness();
    let handlers: Vec<_> = config
        .all_stage_jobs()
        .into_iter()
        .map(|job_type| ScriptedHandler::new(job_type, Behavior::FailTimes(1)))
        .collect();
    for handler in &handlers {
        h.registry.register(handler.clone()).unwrap();
    }

    let orchestrator = Arc::new(Orchestrator::new(
        h.store.clone(),
        h.broker.clone(),
        &config,
    ));
    h.registry
        .register(Arc::new(OrchestrateFullSyncHandler::new(orchestrator.clone())))
        .unwrap();

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = h.worker.clone().spawn(shutdown_tx.subscribe());

    let outcome = orchestrator.run_full_sync().await.unwrap();
    assert_eq!(outcome.final_state, OrchestrationState::Completed);

    shutdown_tx.send(()).unwrap();
    let stats = worker.await.unwrap();

    assert!(handlers.iter().all(|handler| handler.attempts() == 2));
    assert_eq!(stats.succeeded, 6);
    assert_eq!(stats.retried, 6);
    assert_eq!(
        h.store.get_value(keys::SYNC_RUNNING).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_trigger_runs_through_worker() {
    let config = common::test_config();
    let h = harness();
    for job_type in config.all_stage_jobs() {
        h.registry
            .register(ScriptedHandler::new(job_type, Behavior::Succeed))
            .unwrap();
    }
    let orchestrator = Arc::new(Orchestrator::new(
        h.store.clone(),
        h.broker.clone(),
        &config,
    ));
    h.registry
        .register(Arc::new(OrchestrateFullSyncHandler::new(orchestrator)))
        .unwrap();

    h.broker.enqueue(JobType::OrchestrateFull).await.unwrap();

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = h.worker.clone().spawn(shutdown_tx.subscribe());

    tokio::time::sleep(Duration::from_secs(30)).await;
    shutdown_tx.send(()).unwrap();
    let stats = worker.await.unwrap();

    assert_eq!(stats.succeeded, 7);
    assert_eq!(h.broker.submitted().len(), 7);
    assert_eq!(h.store.live_key_count(), 0);
}
