//! Timeslice barrier
//!
//! A single [`Orchestrator`] task consumes worker messages and drives the
//! latches in [`BarrierSignals`]. Workers talk to it through a cloneable
//! [`BarrierClient`].
//!
//! `timeslice_started` fires once every tracked worker sent
//! `TimesliceStart`, clearing `timeslice_finished` first; `timeslice_finished`
//! fires once every tracked worker sent `TimesliceDone`, clearing
//! `timeslice_started` first. No worker can therefore begin timeslice k+1
//! while another is still inside timeslice k.

use crate::error::{WorkerError, WorkerResult};
use crate::signals::{BarrierSignals, Latch, WorkerIndex, WorkerMessage};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use wms_scheduler::Shutdown;

const FEEDBACK_CAPACITY: usize = 256;

/// What the orchestrator saw before stopping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BarrierSummary {
    /// Timeslice rounds completed by the whole fleet
    pub rounds: u32,
    /// Whether it stopped on shutdown rather than on the last `Finished`
    pub cancelled: bool,
}

/// Create an orchestrator for `expected` regular workers and its client
pub fn barrier(expected: usize, shutdown: Shutdown) -> (Orchestrator, BarrierClient) {
    let (tx, rx) = mpsc::channel(FEEDBACK_CAPACITY);
    let signals = Arc::new(BarrierSignals::new());
    let orchestrator = Orchestrator {
        signals: Arc::clone(&signals),
        rx,
        expected,
        shutdown: shutdown.clone(),
    };
    let client = BarrierClient {
        signals,
        tx,
        shutdown,
    };
    (orchestrator, client)
}

/// Coordinator task
pub struct Orchestrator {
    signals: Arc<BarrierSignals>,
    rx: mpsc::Receiver<WorkerMessage>,
    expected: usize,
    shutdown: Shutdown,
}

/// Round bookkeeping; a round fires only when its set is non-empty and
/// covers every tracked worker
#[derive(Debug, Default)]
struct Rounds {
    registered: BTreeSet<WorkerIndex>,
    tracked: BTreeSet<WorkerIndex>,
    started: BTreeSet<WorkerIndex>,
    done: BTreeSet<WorkerIndex>,
    completed: u32,
}

impl Orchestrator {
    /// Shared latches
    pub fn signals(&self) -> &Arc<BarrierSignals> {
        &self.signals
    }

    /// Run until every worker finished or shutdown is requested
    ///
    /// `stop_all` is set on the way out in both cases.
    pub async fn run(mut self) -> BarrierSummary {
        let mut rounds = Rounds::default();
        let mut shutdown = self.shutdown.clone();
        if self.expected == 0 {
            self.signals.workers_ready.set();
            self.signals.stop_all.set();
            return BarrierSummary::default();
        }

        let cancelled = loop {
            let message = tokio::select! {
                message = self.rx.recv() => message,
                _ = shutdown.wait() => break true,
            };
            let Some(message) = message else {
                tracing::warn!("all barrier clients dropped");
                break false;
            };
            tracing::debug!(%message, "barrier message");
            if self.handle(&mut rounds, message) {
                break false;
            }
        };
        // Cancelled workers may all report Finished before shutdown is polled
        let cancelled = cancelled || self.shutdown.is_triggered();

        self.signals.stop_all.set();
        // Unblock anyone still parked on a round
        self.signals.workers_ready.set();
        if cancelled {
            self.signals.timeslice_started.set();
            self.signals.timeslice_finished.set();
        }
        tracing::info!(rounds = rounds.completed, cancelled, "orchestrator stopped");
        BarrierSummary {
            rounds: rounds.completed,
            cancelled,
        }
    }

    /// Apply one message; true once no worker is left
    fn handle(&self, rounds: &mut Rounds, message: WorkerMessage) -> bool {
        match message {
            WorkerMessage::Ready(w) => {
                rounds.registered.insert(w);
                rounds.tracked.insert(w);
                if rounds.registered.len() >= self.expected && !self.signals.workers_ready.is_set() {
                    tracing::info!(workers = rounds.tracked.len(), "all workers ready");
                    self.signals.workers_ready.set();
                }
            }
            WorkerMessage::TimesliceStart(w) => {
                rounds.started.insert(w);
            }
            WorkerMessage::TimesliceDone(w) => {
                rounds.done.insert(w);
            }
            WorkerMessage::Finished(w) => {
                rounds.registered.insert(w);
                rounds.tracked.remove(&w);
                rounds.started.remove(&w);
                rounds.done.remove(&w);
                if rounds.registered.len() >= self.expected && !self.signals.workers_ready.is_set() {
                    self.signals.workers_ready.set();
                }
            }
        }

        // Only complete rounds fire; workers still registering hold them back
        if rounds.registered.len() < self.expected {
            return false;
        }
        if fires(&rounds.started, &rounds.tracked) {
            rounds.started.clear();
            switch(&self.signals.timeslice_finished, &self.signals.timeslice_started);
        }
        if fires(&rounds.done, &rounds.tracked) {
            rounds.done.clear();
            rounds.completed += 1;
            switch(&self.signals.timeslice_started, &self.signals.timeslice_finished);
            tracing::debug!(round = rounds.completed, "timeslice finished fleet-wide");
        }
        rounds.tracked.is_empty()
    }
}

fn fires(round: &BTreeSet<WorkerIndex>, tracked: &BTreeSet<WorkerIndex>) -> bool {
    !round.is_empty() && tracked.is_subset(round)
}

fn switch(lower: &Latch, raise: &Latch) {
    lower.clear();
    raise.set();
}

/// Worker-side handle on the barrier
#[derive(Clone, Debug)]
pub struct BarrierClient {
    signals: Arc<BarrierSignals>,
    tx: mpsc::Sender<WorkerMessage>,
    shutdown: Shutdown,
}

impl BarrierClient {
    /// Shared latches
    pub fn signals(&self) -> &Arc<BarrierSignals> {
        &self.signals
    }

    /// Whether the orchestrator asked background workers to stop
    pub fn stop_requested(&self) -> bool {
        self.signals.stop_all.is_set()
    }

    async fn send(&self, message: WorkerMessage) -> WorkerResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|e| {
                // The orchestrator drops its receiver on shutdown
                if self.shutdown.is_triggered() {
                    WorkerError::Cancelled
                } else {
                    WorkerError::BarrierClosed(e.to_string())
                }
            })
    }

    async fn wait(&self, latch: &Latch) -> WorkerResult<()> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(WorkerError::Cancelled),
            _ = latch.wait_set() => {}
        }
        // On shutdown the orchestrator raises every latch before exiting
        self.shutdown.check().map_err(|_| WorkerError::Cancelled)
    }

    /// Announce a regular worker and wait for the whole fleet
    pub async fn ready(&self, worker: WorkerIndex) -> WorkerResult<()> {
        self.send(WorkerMessage::Ready(worker)).await?;
        self.wait_workers_ready().await
    }

    /// Wait until every regular worker registered
    pub async fn wait_workers_ready(&self) -> WorkerResult<()> {
        self.wait(&self.signals.workers_ready).await
    }

    /// Ask to start a timeslice and wait until everyone did
    pub async fn start_timeslice(&self, worker: WorkerIndex) -> WorkerResult<()> {
        self.send(WorkerMessage::TimesliceStart(worker)).await?;
        self.wait(&self.signals.timeslice_started).await
    }

    /// Report the timeslice done and wait until everyone did
    pub async fn finish_timeslice(&self, worker: WorkerIndex) -> WorkerResult<()> {
        self.send(WorkerMessage::TimesliceDone(worker)).await?;
        self.wait(&self.signals.timeslice_finished).await
    }

    /// Leave the fleet; never blocks on peers
    pub async fn finished(&self, worker: WorkerIndex) {
        if let Err(e) = self.send(WorkerMessage::Finished(worker)).await {
            tracing::debug!(worker, error = %e, "orchestrator gone before finish");
        }
    }
}
