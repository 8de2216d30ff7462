//! # wms-metrics
//!
//! Per-worker counters for the scheduler bench.
//!
//! Every worker owns one [`WorkerMetrics`]; the scheduler bumps counters
//! (conflicts, executed operations, errors) and times timeslices. With
//! profiling enabled the launcher dumps a [`MetricsSnapshot`] per worker to
//! a file derived from the profile template by [`profile_path`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;

pub use collector::WorkerMetrics;
pub use export::{profile_path, HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;

/// Well-known metric names
pub mod names {
    /// Units of work rolled back on a serialization conflict
    pub const CONFLICTS: &str = "conflicts";
    /// Operations executed by regular workers
    pub const OPERATIONS_EXECUTED: &str = "operations_executed";
    /// Units of work skipped on a non-transient error
    pub const ERRORS: &str = "errors";
    /// Attempts that found a ready operation locked by someone else
    pub const CONTENDED: &str = "contended";
    /// Timeslices completed
    pub const TIMESLICES: &str = "timeslices";
    /// Requests reserved by reservers
    pub const REQUESTS_RESERVED: &str = "requests_reserved";
    /// Requests planned by planners
    pub const REQUESTS_PLANNED: &str = "requests_planned";
    /// Sales recorded at timeslice start
    pub const SALES: &str = "sales";
    /// Purchases (pack arrivals) planned at timeslice start
    pub const PURCHASES: &str = "purchases";
    /// Wall time of a timeslice, milliseconds
    pub const TIMESLICE_MS: &str = "timeslice_ms";
    /// Wall time of one unit of work, milliseconds
    pub const UNIT_MS: &str = "unit_ms";
    /// Current backoff of a continuous worker, milliseconds
    pub const SLEEP_MS: &str = "sleep_ms";
}

/// Time a block into a millisecond histogram
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.observe($name, start.elapsed().as_secs_f64() * 1000.0);
        result
    }};
}
