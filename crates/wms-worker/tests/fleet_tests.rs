//! Whole-fleet runs: regular workers, a planner and a reserver on one store

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wms_domain::seed::{install, SeedConfig};
use wms_domain::{
    ContinuousWorkerRecord, Operation, OperationId, RegularWorkerRecord, Reservation, Sale,
};
use wms_metrics::{names, WorkerMetrics};
use wms_scheduler::{ConflictRetryLoop, ReadinessStrategy, Shutdown, ShutdownHandle};
use wms_store::Store;
use wms_worker::{
    barrier, ContinuousConfig, ContinuousWorker, Planner, RegularSummary, RegularWorker, Reserver,
    Seller, WorkerError,
};

struct Fleet {
    regular: Vec<tokio::task::JoinHandle<Result<RegularSummary, WorkerError>>>,
    background: Vec<tokio::task::JoinHandle<Result<wms_worker::ContinuousSummary, WorkerError>>>,
    orchestrator: tokio::task::JoinHandle<wms_worker::BarrierSummary>,
    metrics: Vec<Arc<WorkerMetrics>>,
}

fn runner(store: &Store, kind: &str, id: u64, shutdown: &Shutdown) -> ConflictRetryLoop {
    ConflictRetryLoop::new(
        store.clone(),
        Arc::new(WorkerMetrics::new(kind, id)),
        shutdown.clone(),
    )
}

fn launch(
    store: &Store,
    regulars: u64,
    timeslices: u32,
    strategy: ReadinessStrategy,
    shutdown: Shutdown,
) -> Fleet {
    let (orchestrator, client) = barrier(regulars as usize, shutdown.clone());
    let orchestrator = tokio::spawn(orchestrator.run());
    let config = ContinuousConfig {
        sleep_interval_ms: 1,
        max_sleep_ms: 10,
    };
    let products = SeedConfig::small().products();
    let mut metrics = Vec::new();

    let mut background = Vec::new();
    let reserver = runner(store, "reserver", 0, &shutdown);
    metrics.push(reserver.metrics().clone());
    background.push(tokio::spawn(
        ContinuousWorker::new(Reserver, reserver, client.clone(), config.clone())
            .with_cleanup(true)
            .run(),
    ));
    let planner = runner(store, "planner", 0, &shutdown);
    metrics.push(planner.metrics().clone());
    background.push(tokio::spawn(
        ContinuousWorker::new(Planner, planner, client.clone(), config)
            .with_cleanup(true)
            .run(),
    ));

    let mut regular = Vec::new();
    for index in 0..regulars {
        let runner = runner(store, "regular", index, &shutdown);
        metrics.push(runner.metrics().clone());
        let seller = Seller::new(products.clone(), 2, index);
        let worker =
            RegularWorker::register(index, runner, client.clone(), strategy, seller, timeslices)
                .unwrap();
        regular.push(tokio::spawn(worker.run()));
    }

    Fleet {
        regular,
        background,
        orchestrator,
        metrics,
    }
}

fn seeded() -> Store {
    let store = Store::new();
    install(&store, &SeedConfig::small()).unwrap();
    store
}

/// No executed operation may have a planned predecessor
fn assert_causal(store: &Store) {
    let ops = store.begin().scan::<Operation>().unwrap();
    let planned: HashSet<OperationId> = ops.iter().filter(|op| op.is_planned()).map(|op| op.id).collect();
    for op in ops.iter().filter(|op| !op.is_planned()) {
        for pred in &op.follows {
            assert!(!planned.contains(pred), "{} executed before {}", op.id, pred);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fleet_runs_to_completion() {
    let store = seeded();
    let fleet = launch(&store, 3, 4, ReadinessStrategy::GraphClimb, Shutdown::never());

    let run = async {
        let mut executed = 0;
        for handle in fleet.regular {
            let summary = handle.await.unwrap().unwrap();
            assert_eq!(summary.timeslices, 4);
            executed += summary.executed;
        }
        for handle in fleet.background {
            handle.await.unwrap().unwrap();
        }
        let barrier = fleet.orchestrator.await.unwrap();
        (executed, barrier)
    };
    let (executed, barrier) = tokio::time::timeout(Duration::from_secs(30), run).await.unwrap();
    assert_eq!(barrier.rounds, 4);
    assert!(!barrier.cancelled);
    assert!(executed > 0);

    let txn = store.begin();
    for record in txn.scan::<RegularWorkerRecord>().unwrap() {
        assert!(!record.active);
        assert_eq!(record.done_timeslice, 4);
    }
    assert!(txn.scan::<ContinuousWorkerRecord>().unwrap().is_empty());
    // Three workers, two sales each, four timeslices
    assert_eq!(txn.scan::<Sale>().unwrap().len(), 24);

    // No goods reserved twice
    let reservations = txn.scan::<Reservation>().unwrap();
    let goods: HashSet<_> = reservations.iter().map(|r| r.goods).collect();
    assert_eq!(goods.len(), reservations.len());
    drop(txn);

    assert_causal(&store);

    let total: u64 = fleet
        .metrics
        .iter()
        .map(|m| m.counter(names::OPERATIONS_EXECUTED))
        .sum();
    assert_eq!(total, executed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fleet_with_avatar_join() {
    let store = seeded();
    let fleet = launch(&store, 2, 3, ReadinessStrategy::AvatarJoin, Shutdown::never());
    let run = async {
        for handle in fleet.regular {
            handle.await.unwrap().unwrap();
        }
        for handle in fleet.background {
            handle.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(30), run).await.unwrap();
    assert_causal(&store);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_stops_every_worker() {
    let store = seeded();
    let handle = ShutdownHandle::new();
    let fleet = launch(&store, 2, 10_000, ReadinessStrategy::GraphClimb, handle.subscribe());

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.trigger();

    let run = async {
        for task in fleet.regular {
            assert!(matches!(task.await.unwrap(), Err(WorkerError::Cancelled)));
        }
        for task in fleet.background {
            // Background workers either notice stop_all or the shutdown
            let _ = task.await.unwrap();
        }
        fleet.orchestrator.await.unwrap()
    };
    let barrier = tokio::time::timeout(Duration::from_secs(10), run).await.unwrap();
    assert!(barrier.cancelled);

    let txn = store.begin();
    assert!(txn.scan::<RegularWorkerRecord>().unwrap().iter().all(|r| !r.active));
    assert!(txn.scan::<ContinuousWorkerRecord>().unwrap().is_empty());
}
