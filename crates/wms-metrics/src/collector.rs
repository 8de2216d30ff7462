//! Per-worker metric registry

use crate::Histogram;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters, gauges and histograms of one worker
///
/// Cheap to share behind an `Arc`; all updates are lock-free once a metric
/// exists.
pub struct WorkerMetrics {
    worker_type: String,
    worker_id: u64,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicI64>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
}

impl WorkerMetrics {
    /// Empty registry for a worker
    pub fn new(worker_type: impl Into<String>, worker_id: u64) -> Self {
        Self {
            worker_type: worker_type.into(),
            worker_id,
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    /// Worker type label (`regular`, `planner`, `reserver`)
    pub fn worker_type(&self) -> &str {
        &self.worker_type
    }

    /// Worker id within its type
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Add `delta` to a counter
    pub fn add(&self, name: &str, delta: u64) {
        get_or_insert(&self.counters, name, || AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Add one to a counter
    pub fn incr(&self, name: &str) {
        self.add(name, 1);
    }

    /// Set a gauge
    pub fn set(&self, name: &str, value: i64) {
        get_or_insert(&self.gauges, name, || AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    /// Record a histogram observation
    pub fn observe(&self, name: &str, value: f64) {
        get_or_insert(&self.histograms, name, Histogram::new).observe(value);
    }

    /// Counter value, 0 if never touched
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Gauge value
    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Number of observations of a histogram
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        self.histograms.read().get(name).map(|h| h.total_count())
    }

    pub(crate) fn counters(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn histograms(&self) -> Vec<(String, Arc<Histogram>)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }
}

impl fmt::Debug for WorkerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerMetrics")
            .field("worker_type", &self.worker_type)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

fn get_or_insert<T>(
    map: &RwLock<HashMap<String, Arc<T>>>,
    name: &str,
    init: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(existing) = map.read().get(name) {
        return Arc::clone(existing);
    }
    let mut map = map.write();
    Arc::clone(
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(init())),
    )
}
