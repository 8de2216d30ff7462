//! # wms-scheduler
//!
//! Conflict-tolerant selection and execution of warehouse operations.
//!
//! Workers share one transactional store and never wait on each other's
//! row locks. This crate provides the pieces they are built from:
//! - [`ConflictRetryLoop`]: one unit of work per transaction, conflicts
//!   retried silently
//! - [`ReadinessStrategy`]: finding and locking an executable operation
//! - [`claim_reservations`]: claiming a reserved request for planning
//! - [`DependencyGraph`]: the `follows` relation of planned operations
//! - [`Shutdown`]: cooperative cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod claim;
pub mod dependency;
pub mod error;
pub mod readiness;
pub mod retry;
pub mod shutdown;

pub use claim::{claim_reservations, mark_planned};
pub use dependency::DependencyGraph;
pub use error::{SchedulerError, SchedulerResult};
pub use readiness::{select_ready_operation, Readiness, ReadinessStrategy};
pub use retry::{ConflictRetryLoop, UnitOutcome};
pub use shutdown::{Shutdown, ShutdownHandle};
