//! Background workers
//!
//! Continuous workers have no timeslice of their own. They poll for work
//! as long as a regular worker is active, backing off while idle, and stop
//! when the orchestrator raises `stop_all` or the last regular worker
//! deactivates.

use crate::barrier::BarrierClient;
use crate::error::{WorkerError, WorkerResult};
use serde::Deserialize;
use std::time::Duration;
use wms_domain::workers::{any_regular_active, cleanup_continuous, register_continuous, unregister_continuous};
use wms_domain::{ContinuousKind, ContinuousWorkerRecord};
use wms_metrics::names;
use wms_scheduler::{ConflictRetryLoop, SchedulerResult, UnitOutcome};
use wms_store::Transaction;

/// Idle backoff of continuous workers
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    /// Backoff step, milliseconds
    pub sleep_interval_ms: u64,
    /// Backoff cap, milliseconds
    pub max_sleep_ms: u64,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            sleep_interval_ms: 10,
            max_sleep_ms: 1000,
        }
    }
}

impl ContinuousConfig {
    /// Sleep after `inactivity` consecutive idle rounds
    pub fn backoff(&self, inactivity: u32) -> Duration {
        let ms = self
            .sleep_interval_ms
            .saturating_mul(u64::from(inactivity))
            .min(self.max_sleep_ms);
        Duration::from_millis(ms)
    }
}

/// Lifecycle state of a continuous worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContinuousState {
    /// Registered, waiting for every regular worker to register
    WaitingForPeers,
    /// Polling for work
    Running,
    /// Done polling; record removed
    Stopped,
}

/// One kind of background work
pub trait ContinuousWork: Send {
    /// Role recorded in the worker registry
    const KIND: ContinuousKind;

    /// Counter bumped for every committed unit that did something
    const PROCESSED: &'static str;

    /// Do one unit of work in `txn`; `false` when there was nothing to do
    fn process_one(&mut self, txn: &mut Transaction) -> SchedulerResult<bool>;
}

/// What a continuous worker did over its run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContinuousSummary {
    /// Units that did something
    pub processed: u64,
    /// Units that found nothing to do
    pub idle: u64,
}

/// Polling loop around a [`ContinuousWork`]
pub struct ContinuousWorker<W> {
    work: W,
    runner: ConflictRetryLoop,
    barrier: BarrierClient,
    config: ContinuousConfig,
    cleanup: bool,
    inactivity: u32,
    state: ContinuousState,
    summary: ContinuousSummary,
}

impl<W: ContinuousWork> ContinuousWorker<W> {
    /// Create a worker; nothing is registered until [`run`](Self::run)
    pub fn new(work: W, runner: ConflictRetryLoop, barrier: BarrierClient, config: ContinuousConfig) -> Self {
        Self {
            work,
            runner,
            barrier,
            config,
            cleanup: false,
            inactivity: 0,
            state: ContinuousState::WaitingForPeers,
            summary: ContinuousSummary::default(),
        }
    }

    /// Delete stale records of the same kind at startup
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContinuousState {
        self.state
    }

    /// Consecutive idle rounds so far
    pub fn inactivity(&self) -> u32 {
        self.inactivity
    }

    /// Poll until regular workers are done
    pub async fn run(mut self) -> WorkerResult<ContinuousSummary> {
        let record = self.register()?;
        let result = self.poll().await;
        self.state = ContinuousState::Stopped;
        self.unregister(&record);
        match &result {
            Ok(summary) => tracing::info!(
                kind = %W::KIND,
                processed = summary.processed,
                idle = summary.idle,
                "continuous worker stopping"
            ),
            Err(e) if e.is_cancelled() => tracing::info!(kind = %W::KIND, "continuous worker cancelled"),
            Err(e) => tracing::error!(kind = %W::KIND, error = %e, "continuous worker failed"),
        }
        result
    }

    fn register(&self) -> WorkerResult<ContinuousWorkerRecord> {
        let mut txn = self.runner.store().begin();
        if self.cleanup {
            let removed = cleanup_continuous(&mut txn, W::KIND)?;
            if removed > 0 {
                tracing::info!(kind = %W::KIND, removed, "removed stale worker records");
            }
        }
        let record = register_continuous(&mut txn, std::process::id(), W::KIND)?;
        txn.commit()?;
        tracing::info!(kind = %W::KIND, id = %record.id, "continuous worker registered");
        Ok(record)
    }

    fn unregister(&self, record: &ContinuousWorkerRecord) {
        let mut txn = self.runner.store().begin();
        let result = match unregister_continuous(&mut txn, record.id) {
            Ok(()) => txn.commit().map(|_| ()).map_err(Into::into),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(kind = %W::KIND, error = %e, "could not unregister");
        }
    }

    async fn poll(&mut self) -> WorkerResult<ContinuousSummary> {
        // Regular workers are only known to be active once all registered
        self.state = ContinuousState::WaitingForPeers;
        self.barrier.wait_workers_ready().await?;
        self.state = ContinuousState::Running;
        while self.should_proceed()? {
            let work = &mut self.work;
            match self.runner.run(W::KIND.to_string().as_str(), |txn| work.process_one(txn))? {
                UnitOutcome::Committed(done) => self.maybe_sleep(done).await?,
                UnitOutcome::Retry | UnitOutcome::Skipped => {
                    tokio::task::yield_now().await;
                }
            }
        }
        Ok(self.summary)
    }

    fn should_proceed(&self) -> WorkerResult<bool> {
        if self.barrier.stop_requested() {
            return Ok(false);
        }
        let txn = self.runner.store().begin();
        Ok(any_regular_active(&txn)?)
    }

    async fn maybe_sleep(&mut self, something_done: bool) -> WorkerResult<()> {
        if something_done {
            self.inactivity = 0;
            self.summary.processed += 1;
            self.runner.metrics().incr(W::PROCESSED);
            return Ok(());
        }
        self.inactivity += 1;
        self.summary.idle += 1;
        let sleep = self.config.backoff(self.inactivity);
        self.runner.metrics().set(names::SLEEP_MS, sleep.as_millis() as i64);
        tracing::debug!(kind = %W::KIND, sleep_ms = sleep.as_millis() as u64, "nothing to do, sleeping");

        let mut shutdown = self.runner.shutdown().clone();
        let stop = self.barrier.signals().clone();
        tokio::select! {
            _ = tokio::time::sleep(sleep) => Ok(()),
            _ = stop.stop_all.wait_set() => Ok(()),
            _ = shutdown.wait() => Err(WorkerError::Cancelled),
        }
    }
}
