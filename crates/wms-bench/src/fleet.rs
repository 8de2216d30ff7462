//! Launching and joining the worker fleet

use crate::config::BenchConfig;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use wms_metrics::{names, profile_path, MetricsSnapshot, WorkerMetrics};
use wms_scheduler::{ConflictRetryLoop, Shutdown};
use wms_store::Store;
use wms_worker::{
    barrier, BarrierClient, ContinuousSummary, ContinuousWork, ContinuousWorker, Planner,
    RegularSummary, RegularWorker, Reserver, Seller, WorkerResult,
};

/// Fleet shape and run parameters
#[derive(Debug, Clone)]
pub struct FleetParams {
    /// Timeslices per regular worker
    pub timeslices: u32,
    /// Regular workers
    pub regular_workers: u64,
    /// Planner workers
    pub planner_workers: u64,
    /// Sales per regular worker and timeslice
    pub sales_per_timeslice: u32,
    /// Profile template, when profiling
    pub profile: Option<PathBuf>,
}

/// Outcome of a bench run
#[derive(Debug, Clone, Default)]
pub struct BenchReport {
    /// Timeslices completed fleet-wide
    pub rounds: u32,
    /// Whether the run was cut short
    pub cancelled: bool,
    /// Operations executed by all regular workers
    pub executed: u64,
    /// Conflicts retried by all workers
    pub conflicts: u64,
    /// Workers that ended in error, cancellation excluded
    pub failed: usize,
    /// Wall time
    pub elapsed: Duration,
    /// Profile files written
    pub profiles: Vec<PathBuf>,
}

/// The warehouse store and everything running against it
pub struct Fleet {
    store: Store,
    config: BenchConfig,
    params: FleetParams,
}

impl Fleet {
    /// Create a fleet over an already seeded store
    pub fn new(store: Store, config: BenchConfig, params: FleetParams) -> Self {
        Self {
            store,
            config,
            params,
        }
    }

    fn runner(&self, worker_type: &str, id: u64, shutdown: &Shutdown) -> ConflictRetryLoop {
        ConflictRetryLoop::new(
            self.store.clone(),
            Arc::new(WorkerMetrics::new(worker_type, id)),
            shutdown.clone(),
        )
    }

    fn spawn_continuous<W>(
        &self,
        work: W,
        id: u64,
        cleanup: bool,
        client: &BarrierClient,
        shutdown: &Shutdown,
    ) -> (JoinHandle<WorkerResult<ContinuousSummary>>, Arc<WorkerMetrics>)
    where
        W: ContinuousWork + 'static,
    {
        let runner = self.runner(&W::KIND.to_string(), id, shutdown);
        let metrics = runner.metrics().clone();
        let worker = ContinuousWorker::new(work, runner, client.clone(), self.config.continuous.clone())
            .with_cleanup(cleanup);
        (tokio::spawn(worker.run()), metrics)
    }

    /// Run every worker to completion, or until shutdown
    pub async fn run(&self, shutdown: Shutdown) -> anyhow::Result<BenchReport> {
        let started = Instant::now();
        let params = &self.params;
        let (orchestrator, client) = barrier(params.regular_workers as usize, shutdown.clone());
        let orchestrator = tokio::spawn(orchestrator.run());
        let mut metrics = Vec::new();

        let mut background = Vec::new();
        let (task, m) = self.spawn_continuous(Reserver, 0, true, &client, &shutdown);
        background.push(task);
        metrics.push(m);
        for id in 0..params.planner_workers {
            // Only the first planner clears stale records
            let (task, m) = self.spawn_continuous(Planner, id, id == 0, &client, &shutdown);
            background.push(task);
            metrics.push(m);
        }

        let products = self.config.seed.products();
        let mut regular: Vec<JoinHandle<WorkerResult<RegularSummary>>> = Vec::new();
        let mut registration = Ok(());
        for index in 0..params.regular_workers {
            let runner = self.runner("regular", index, &shutdown);
            metrics.push(runner.metrics().clone());
            let seller = Seller::new(
                products.clone(),
                params.sales_per_timeslice,
                self.config.rng_seed.wrapping_add(index),
            );
            let worker = match RegularWorker::register(
                index,
                runner,
                client.clone(),
                self.config.readiness,
                seller,
                params.timeslices,
            ) {
                Ok(worker) => worker,
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "could not register regular worker");
                    release_unregistered(&client, index..params.regular_workers).await;
                    registration = Err(e);
                    break;
                }
            };
            regular.push(tokio::spawn(worker.run()));
        }
        drop(client);
        tracing::info!(
            regular = params.regular_workers,
            planners = params.planner_workers,
            timeslices = params.timeslices,
            readiness = self.config.readiness.name(),
            "fleet started"
        );

        let mut report = BenchReport::default();
        for task in regular {
            match task.await? {
                Ok(summary) => report.executed += summary.executed,
                Err(e) if e.is_cancelled() => {}
                Err(_) => report.failed += 1,
            }
        }
        for task in background {
            match task.await? {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => {}
                Err(_) => report.failed += 1,
            }
        }
        let barrier = orchestrator.await?;
        registration?;
        report.rounds = barrier.rounds;
        report.cancelled = barrier.cancelled;
        report.conflicts = metrics.iter().map(|m| m.counter(names::CONFLICTS)).sum();
        report.elapsed = started.elapsed();

        if let Some(template) = &params.profile {
            for m in &metrics {
                let path = profile_path(template, m.worker_type(), m.worker_id());
                MetricsSnapshot::capture(m).write_to_file(&path)?;
                tracing::debug!(path = %path.display(), "wrote profile");
                report.profiles.push(path);
            }
        }
        Ok(report)
    }
}

/// Report workers that never registered as finished, so the barrier stops
/// waiting for them and the registered ones can run on
async fn release_unregistered(client: &BarrierClient, indices: Range<u64>) {
    for index in indices {
        client.finished(index).await;
    }
}
