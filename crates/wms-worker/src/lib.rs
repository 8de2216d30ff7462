//! # wms-worker
//!
//! Worker lifecycles of the warehouse scheduler bench.
//!
//! - [`RegularWorker`]: runs a fixed number of timeslices in lockstep with
//!   its peers, executing every ready operation in each
//! - [`ContinuousWorker`]: background [`Planner`] and [`Reserver`] loops
//!   that run while any regular worker is active
//! - [`barrier`]: the orchestrator keeping regular workers within one
//!   timeslice of each other

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod continuous;
pub mod error;
pub mod planner;
pub mod regular;
pub mod reserver;
pub mod seller;
pub mod signals;

pub use barrier::{barrier, BarrierClient, BarrierSummary, Orchestrator};
pub use continuous::{ContinuousConfig, ContinuousState, ContinuousSummary, ContinuousWork, ContinuousWorker};
pub use error::{WorkerError, WorkerResult};
pub use planner::Planner;
pub use regular::{process_one, NoHook, RegularState, RegularSummary, RegularWorker, Step, TimesliceHook};
pub use reserver::Reserver;
pub use seller::Seller;
pub use signals::{BarrierSignals, Latch, WorkerIndex, WorkerMessage};
