//! Millisecond histogram

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Distribution of durations in milliseconds
pub struct Histogram {
    /// Upper bucket bounds, inclusive
    bounds: Vec<f64>,
    /// One count per bound plus an overflow bucket
    counts: Vec<AtomicU64>,
    count: AtomicU64,
    /// Sum and max, in f64 to keep sub-millisecond observations
    totals: Mutex<(f64, f64)>,
}

impl Histogram {
    /// Histogram with buckets suited to unit-of-work and timeslice durations
    pub fn new() -> Self {
        Self::with_bounds(vec![
            1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0,
        ])
    }

    /// Histogram with custom upper bounds, ascending
    pub fn with_bounds(bounds: Vec<f64>) -> Self {
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            count: AtomicU64::new(0),
            totals: Mutex::new((0.0, 0.0)),
        }
    }

    /// Record one observation
    pub fn observe(&self, value: f64) {
        let bucket = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut totals = self.totals.lock();
        totals.0 += value;
        if value > totals.1 {
            totals.1 = value;
        }
    }

    /// Mean of all observations, 0 when empty
    pub fn mean(&self) -> f64 {
        let count = self.total_count();
        if count == 0 {
            return 0.0;
        }
        self.totals.lock().0 / count as f64
    }

    /// Largest observation, 0 when empty
    pub fn max(&self) -> f64 {
        self.totals.lock().1
    }

    /// Number of observations
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// `(upper bound, count)` per bucket; the overflow bucket has bound `None`
    pub fn buckets(&self) -> Vec<(Option<f64>, u64)> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, c)| (self.bounds.get(i).copied(), c.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketing_and_overflow() {
        let h = Histogram::with_bounds(vec![1.0, 10.0]);
        h.observe(0.5);
        h.observe(1.0);
        h.observe(7.0);
        h.observe(99.0);

        assert_eq!(
            h.buckets(),
            vec![(Some(1.0), 2), (Some(10.0), 1), (None, 1)]
        );
        assert_eq!(h.total_count(), 4);
        assert_eq!(h.max(), 99.0);
    }

    #[test]
    fn test_mean_keeps_fractions() {
        let h = Histogram::new();
        assert_eq!(h.mean(), 0.0);
        h.observe(0.25);
        h.observe(0.75);
        assert!((h.mean() - 0.5).abs() < f64::EPSILON);
    }
}
