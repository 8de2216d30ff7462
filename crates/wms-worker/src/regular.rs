//! Timeslice-driven workers
//!
//! A regular worker runs `begin_timeslice`, then executes ready operations
//! until the readiness query reports nothing left, records the timeslice as
//! done and meets its peers at the barrier:
//!
//! ```text
//! Idle → RunningTimeslice → BarrierWait → Idle → … → Finished
//! ```

use crate::barrier::BarrierClient;
use crate::error::{WorkerError, WorkerResult};
use crate::signals::WorkerIndex;
use std::time::Instant;
use wms_domain::operation::execute;
use wms_domain::workers::{deactivate, finish_timeslice, register_regular};
use wms_domain::{OperationId, RegularWorkerRecord};
use wms_metrics::names;
use wms_scheduler::{ConflictRetryLoop, Readiness, ReadinessStrategy, SchedulerResult, UnitOutcome};
use wms_store::Transaction;

/// Lifecycle state of a regular worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegularState {
    /// Between timeslices
    Idle,
    /// Inside a timeslice
    RunningTimeslice(u32),
    /// Waiting for peers at a timeslice boundary
    BarrierWait(u32),
    /// Done with all timeslices, or cancelled
    Finished,
}

/// Work done at the start of every timeslice, before draining operations
pub trait TimesliceHook: Send {
    /// Run the start-of-timeslice work; each unit goes through `runner`
    fn begin_timeslice(&mut self, runner: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<()>;
}

/// Hook that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHook;

impl TimesliceHook for NoHook {
    fn begin_timeslice(&mut self, _runner: &ConflictRetryLoop, _timeslice: u32) -> WorkerResult<()> {
        Ok(())
    }
}

/// Outcome of one `process_one` attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Executed this operation
    Executed(OperationId),
    /// Something may be left but it is held by peers
    Contended,
    /// Nothing left this timeslice
    Exhausted,
}

/// Find one ready operation and execute it
pub fn process_one(txn: &mut Transaction, strategy: ReadinessStrategy) -> SchedulerResult<Step> {
    match strategy.select(txn)? {
        Readiness::Ready(op) => {
            execute(txn, op.id)?;
            tracing::debug!(op = %op.id, kind = op.kind.name(), "executed");
            Ok(Step::Executed(op.id))
        }
        Readiness::Contended => Ok(Step::Contended),
        Readiness::Exhausted => Ok(Step::Exhausted),
    }
}

/// What a regular worker did over its run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegularSummary {
    /// Timeslices completed
    pub timeslices: u32,
    /// Operations executed
    pub executed: u64,
}

/// Timeslice-driven worker
pub struct RegularWorker<H> {
    index: WorkerIndex,
    record: RegularWorkerRecord,
    runner: ConflictRetryLoop,
    strategy: ReadinessStrategy,
    barrier: BarrierClient,
    hook: H,
    state: RegularState,
    summary: RegularSummary,
}

impl<H: TimesliceHook> RegularWorker<H> {
    /// Register a worker for `timeslices` more timeslices
    pub fn register(
        index: WorkerIndex,
        runner: ConflictRetryLoop,
        barrier: BarrierClient,
        strategy: ReadinessStrategy,
        hook: H,
        timeslices: u32,
    ) -> WorkerResult<Self> {
        let mut txn = runner.store().begin();
        let record = register_regular(&mut txn, std::process::id(), timeslices)?;
        txn.commit()?;
        tracing::info!(
            worker = index,
            from = record.current_timeslice(),
            to = record.max_timeslice,
            "regular worker registered"
        );
        Ok(Self {
            index,
            record,
            runner,
            strategy,
            barrier,
            hook,
            state: RegularState::Idle,
            summary: RegularSummary::default(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> RegularState {
        self.state
    }

    /// Own record as last committed
    pub fn record(&self) -> &RegularWorkerRecord {
        &self.record
    }

    /// Run every timeslice, then leave the fleet
    ///
    /// On cancellation the record is marked inactive before returning
    /// `Err(Cancelled)`.
    pub async fn run(mut self) -> WorkerResult<RegularSummary> {
        let result = self.run_timeslices().await;
        self.state = RegularState::Finished;
        if result.is_err() {
            self.deactivate();
        }
        self.barrier.finished(self.index).await;
        match result {
            Ok(()) => {
                tracing::info!(
                    worker = self.index,
                    timeslices = self.summary.timeslices,
                    executed = self.summary.executed,
                    "regular worker finished"
                );
                Ok(self.summary)
            }
            Err(e) => {
                if e.is_cancelled() {
                    tracing::info!(worker = self.index, "regular worker cancelled");
                } else {
                    tracing::error!(worker = self.index, error = %e, "regular worker failed");
                }
                Err(e)
            }
        }
    }

    async fn run_timeslices(&mut self) -> WorkerResult<()> {
        self.barrier.ready(self.index).await?;
        while !self.record.is_complete() {
            let timeslice = self.record.current_timeslice();
            self.state = RegularState::BarrierWait(timeslice);
            self.barrier.start_timeslice(self.index).await?;

            self.state = RegularState::RunningTimeslice(timeslice);
            self.run_timeslice(timeslice).await?;

            self.state = RegularState::BarrierWait(timeslice);
            self.barrier.finish_timeslice(self.index).await?;
            self.state = RegularState::Idle;
        }
        Ok(())
    }

    /// One full timeslice: start hook, drain, bookkeeping
    async fn run_timeslice(&mut self, timeslice: u32) -> WorkerResult<()> {
        let started = Instant::now();
        let metrics = self.runner.metrics().clone();
        let conflicts_before = metrics.counter(names::CONFLICTS);

        self.hook.begin_timeslice(&self.runner, timeslice)?;
        let executed = self.drain().await?;
        self.mark_done()?;

        let elapsed = started.elapsed();
        metrics.incr(names::TIMESLICES);
        metrics.observe(names::TIMESLICE_MS, elapsed.as_secs_f64() * 1000.0);
        self.summary.timeslices += 1;
        self.summary.executed += executed;
        tracing::info!(
            worker = self.index,
            timeslice,
            executed,
            conflicts = metrics.counter(names::CONFLICTS) - conflicts_before,
            elapsed_ms = elapsed.as_millis() as u64,
            "timeslice done"
        );
        Ok(())
    }

    /// Execute ready operations until none is left
    async fn drain(&mut self) -> WorkerResult<u64> {
        let strategy = self.strategy;
        let mut executed = 0;
        loop {
            match self.runner.run("process_one", |txn| process_one(txn, strategy))? {
                UnitOutcome::Committed(Step::Executed(_)) => {
                    executed += 1;
                    self.runner.metrics().incr(names::OPERATIONS_EXECUTED);
                }
                UnitOutcome::Committed(Step::Exhausted) => return Ok(executed),
                UnitOutcome::Committed(Step::Contended) => {
                    self.runner.metrics().incr(names::CONTENDED);
                }
                UnitOutcome::Retry | UnitOutcome::Skipped => {}
            }
            // Let peers commit what they hold
            tokio::task::yield_now().await;
        }
    }

    fn mark_done(&mut self) -> WorkerResult<()> {
        let id = self.record.id;
        loop {
            match self.runner.run("done_timeslice", |txn| Ok(finish_timeslice(txn, id)?))? {
                UnitOutcome::Committed(record) => {
                    self.record = record;
                    return Ok(());
                }
                UnitOutcome::Retry => continue,
                UnitOutcome::Skipped => {
                    return Err(WorkerError::Bookkeeping(format!(
                        "could not record timeslice {} as done",
                        self.record.current_timeslice()
                    )))
                }
            }
        }
    }

    fn deactivate(&mut self) {
        let mut txn = self.runner.store().begin();
        let result = match deactivate(&mut txn, self.record.id) {
            Ok(record) => txn.commit().map(|_| record).map_err(Into::into),
            Err(e) => Err(e),
        };
        match result {
            Ok(record) => self.record = record,
            Err(e) => tracing::warn!(worker = self.index, error = %e, "could not deactivate record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::barrier;
    use std::sync::Arc;
    use wms_domain::goods::goods_type_by_code;
    use crate::seller::process_arrival;
    use wms_domain::operation::{create_arrival, create_move};
    use wms_domain::seed::{install, pack_code, SeedConfig};
    use wms_domain::workers::any_regular_active;
    use wms_domain::{Locations, Operation, OperationState};
    use wms_metrics::WorkerMetrics;
    use wms_scheduler::{select_ready_operation, Shutdown, ShutdownHandle};
    use wms_store::Store;

    fn runner(store: &Store, shutdown: Shutdown) -> ConflictRetryLoop {
        ConflictRetryLoop::new(
            store.clone(),
            Arc::new(WorkerMetrics::new("regular", 0)),
            shutdown,
        )
    }

    fn plan_moves(store: &Store, count: usize) {
        let mut txn = store.begin();
        let locations = Locations::resolve(&txn).unwrap();
        let pack = goods_type_by_code(&txn, &pack_code("JEANS/25/20")).unwrap();
        for _ in 0..count {
            let arrival =
                create_arrival(&mut txn, pack.id, locations.incoming, 1, chrono::Utc::now()).unwrap();
            create_move(&mut txn, arrival.outcomes[0], locations.stock, chrono::Utc::now()).unwrap();
        }
        txn.commit().unwrap();
    }

    fn seeded() -> Store {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        store
    }

    #[test]
    fn test_process_one_steps() {
        let store = seeded();
        plan_moves(&store, 1);

        let mut txn = store.begin();
        assert!(matches!(
            process_one(&mut txn, ReadinessStrategy::GraphClimb).unwrap(),
            Step::Executed(_)
        ));
        txn.commit().unwrap();
        let mut txn = store.begin();
        assert!(matches!(
            process_one(&mut txn, ReadinessStrategy::GraphClimb).unwrap(),
            Step::Executed(_)
        ));
        txn.commit().unwrap();
        let mut txn = store.begin();
        assert_eq!(
            process_one(&mut txn, ReadinessStrategy::GraphClimb).unwrap(),
            Step::Exhausted
        );
    }

    #[tokio::test]
    async fn test_single_worker_runs_all_timeslices() {
        let store = seeded();
        plan_moves(&store, 3);
        let (orchestrator, client) = barrier(1, Shutdown::never());
        let coordinator = tokio::spawn(orchestrator.run());

        let worker = RegularWorker::register(
            0,
            runner(&store, Shutdown::never()),
            client,
            ReadinessStrategy::GraphClimb,
            NoHook,
            2,
        )
        .unwrap();
        let summary = worker.run().await.unwrap();
        assert_eq!(summary.timeslices, 2);
        assert_eq!(summary.executed, 6);

        let txn = store.begin();
        assert!(txn.select::<Operation>(|op| op.is_planned()).unwrap().is_empty());
        assert!(!any_regular_active(&txn).unwrap());
        assert_eq!(coordinator.await.unwrap().rounds, 2);
    }

    #[tokio::test]
    async fn test_done_timeslice_increments_by_one() {
        struct Recorder(Vec<u32>);
        impl TimesliceHook for Recorder {
            fn begin_timeslice(&mut self, _: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<()> {
                self.0.push(timeslice);
                Ok(())
            }
        }

        let store = seeded();
        let (orchestrator, client) = barrier(1, Shutdown::never());
        tokio::spawn(orchestrator.run());
        let worker = RegularWorker::register(
            0,
            runner(&store, Shutdown::never()),
            client.clone(),
            ReadinessStrategy::GraphClimb,
            Recorder(Vec::new()),
            3,
        )
        .unwrap();
        worker.run().await.unwrap();

        // A second run continues numbering where the first stopped
        let (orchestrator, client) = barrier(1, Shutdown::never());
        tokio::spawn(orchestrator.run());
        let worker = RegularWorker::register(
            0,
            runner(&store, Shutdown::never()),
            client,
            ReadinessStrategy::GraphClimb,
            NoHook,
            2,
        )
        .unwrap();
        assert_eq!(worker.record().current_timeslice(), 4);
        assert_eq!(worker.state(), RegularState::Idle);
        worker.run().await.unwrap();

        let txn = store.begin();
        let records = txn.scan::<RegularWorkerRecord>().unwrap();
        assert_eq!(records[0].done_timeslice, 3);
        assert_eq!(records[1].done_timeslice, 5);
    }

    #[tokio::test]
    async fn test_cancelled_worker_marks_itself_inactive() {
        let store = seeded();
        let handle = ShutdownHandle::new();
        // Barrier expects a second worker that never comes
        let (orchestrator, client) = barrier(2, handle.subscribe());
        tokio::spawn(orchestrator.run());

        let worker = RegularWorker::register(
            0,
            runner(&store, handle.subscribe()),
            client,
            ReadinessStrategy::GraphClimb,
            NoHook,
            5,
        )
        .unwrap();
        let task = tokio::spawn(worker.run());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.trigger();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(WorkerError::Cancelled)));
        assert!(!any_regular_active(&store.begin()).unwrap());
    }

    #[tokio::test]
    async fn test_cancel_is_never_reported_as_closed_barrier() {
        for round in 0..100 {
            let store = Store::new();
            let handle = ShutdownHandle::new();
            let (orchestrator, client) = barrier(2, handle.subscribe());
            tokio::spawn(orchestrator.run());

            let worker = RegularWorker::register(
                0,
                runner(&store, handle.subscribe()),
                client,
                ReadinessStrategy::GraphClimb,
                NoHook,
                5,
            )
            .unwrap();
            let task = tokio::spawn(worker.run());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            handle.trigger();

            let result = task.await.unwrap();
            assert!(
                matches!(result, Err(WorkerError::Cancelled)),
                "round {}: {:?}",
                round,
                result
            );
        }
    }

    // ==================== Arrival Scenario Tests ====================

    /// Executes due arrivals the way the seller does, without purchases
    struct ArrivalDesk;

    impl TimesliceHook for ArrivalDesk {
        fn begin_timeslice(&mut self, runner: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<()> {
            loop {
                match runner.run("arrival", |txn| Ok(process_arrival(txn, timeslice)?))? {
                    UnitOutcome::Committed(Some(_)) | UnitOutcome::Retry => continue,
                    UnitOutcome::Committed(None) | UnitOutcome::Skipped => return Ok(()),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_lone_arrival_runs_in_single_timeslice() {
        let store = seeded();
        let arrival = {
            let mut txn = store.begin();
            let locations = Locations::resolve(&txn).unwrap();
            let pack = goods_type_by_code(&txn, &pack_code("JEANS/25/20")).unwrap();
            let arrival =
                create_arrival(&mut txn, pack.id, locations.incoming, 1, chrono::Utc::now()).unwrap();
            txn.commit().unwrap();
            arrival
        };
        assert!(arrival.follows.is_empty());

        let (orchestrator, client) = barrier(1, Shutdown::never());
        let coordinator = tokio::spawn(orchestrator.run());
        let worker = RegularWorker::register(
            0,
            runner(&store, Shutdown::never()),
            client,
            ReadinessStrategy::GraphClimb,
            ArrivalDesk,
            1,
        )
        .unwrap();
        let summary = worker.run().await.unwrap();
        assert_eq!(summary.timeslices, 1);
        assert_eq!(coordinator.await.unwrap().rounds, 1);

        let mut txn = store.begin();
        let arrival = txn.fetch::<Operation>(arrival.id).unwrap();
        assert_eq!(arrival.state, OperationState::Executed);
        assert_eq!(select_ready_operation(&mut txn).unwrap(), Readiness::Exhausted);

        let records = txn.scan::<RegularWorkerRecord>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].done_timeslice, 1);
        assert!(!records[0].active);
    }
}
