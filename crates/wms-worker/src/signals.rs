//! Barrier messages and latches
//!
//! A [`Latch`] is a level-triggered flag: waiting on a latch that is
//! already set returns at once, so the order of `set` and `wait_set` does
//! not matter.

use std::fmt;
use tokio::sync::watch;

/// Index of a regular worker within the fleet
pub type WorkerIndex = u64;

/// Level-triggered boolean signal
#[derive(Debug)]
pub struct Latch {
    name: &'static str,
    tx: watch::Sender<bool>,
}

impl Latch {
    /// New latch, clear
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(false);
        Self { name, tx }
    }

    /// Latch name, for logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raise the latch
    pub fn set(&self) {
        self.tx.send_replace(true);
        tracing::trace!(latch = self.name, "set");
    }

    /// Lower the latch
    pub fn clear(&self) {
        self.tx.send_replace(false);
        tracing::trace!(latch = self.name, "clear");
    }

    /// Current level
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the latch is set
    pub async fn wait_set(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// The four latches the orchestrator drives
#[derive(Debug)]
pub struct BarrierSignals {
    /// Every regular worker registered
    pub workers_ready: Latch,
    /// Every tracked worker asked to start the current timeslice
    pub timeslice_started: Latch,
    /// Every tracked worker finished the current timeslice
    pub timeslice_finished: Latch,
    /// No regular worker left; background workers should stop
    pub stop_all: Latch,
}

impl BarrierSignals {
    /// All latches clear
    pub fn new() -> Self {
        Self {
            workers_ready: Latch::new("workers_ready"),
            timeslice_started: Latch::new("timeslice_started"),
            timeslice_finished: Latch::new("timeslice_finished"),
            stop_all: Latch::new("stop_all"),
        }
    }
}

impl Default for BarrierSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Feedback from regular workers to the orchestrator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Registered and waiting for peers
    Ready(WorkerIndex),
    /// About to start a timeslice
    TimesliceStart(WorkerIndex),
    /// Done with the current timeslice
    TimesliceDone(WorkerIndex),
    /// Leaving the fleet (completed or cancelled)
    Finished(WorkerIndex),
}

impl WorkerMessage {
    /// Sender of the message
    pub fn worker(&self) -> WorkerIndex {
        match *self {
            WorkerMessage::Ready(w)
            | WorkerMessage::TimesliceStart(w)
            | WorkerMessage::TimesliceDone(w)
            | WorkerMessage::Finished(w) => w,
        }
    }
}

impl fmt::Display for WorkerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMessage::Ready(w) => write!(f, "ready({})", w),
            WorkerMessage::TimesliceStart(w) => write!(f, "timeslice_start({})", w),
            WorkerMessage::TimesliceDone(w) => write!(f, "timeslice_done({})", w),
            WorkerMessage::Finished(w) => write!(f, "finished({})", w),
        }
    }
}
