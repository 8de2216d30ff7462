//! Snapshots and profile files

use crate::WorkerMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Point-in-time copy of one worker's metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Worker type label
    pub worker_type: String,
    /// Worker id within its type
    pub worker_id: u64,
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Number of observations
    pub count: u64,
    /// Mean, milliseconds
    pub mean: f64,
    /// Max, milliseconds
    pub max: f64,
    /// `(upper bound, count)`; `None` bound is the overflow bucket
    pub buckets: Vec<(Option<f64>, u64)>,
}

impl MetricsSnapshot {
    /// Capture the current values
    pub fn capture(metrics: &WorkerMetrics) -> Self {
        Self {
            worker_type: metrics.worker_type().to_string(),
            worker_id: metrics.worker_id(),
            counters: metrics.counters().into_iter().collect(),
            gauges: metrics.gauges().into_iter().collect(),
            histograms: metrics
                .histograms()
                .into_iter()
                .map(|(name, h)| {
                    let summary = HistogramSummary {
                        count: h.total_count(),
                        mean: h.mean(),
                        max: h.max(),
                        buckets: h.buckets(),
                    };
                    (name, summary)
                })
                .collect(),
        }
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write as pretty JSON to `path`
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "wrote profile");
        Ok(())
    }
}

/// Profile file of one worker: `<stem>_<wtype>_<id><.ext>` next to `template`
///
/// `wms.stats` for regular worker 3 becomes `wms_regular_3.stats`.
pub fn profile_path(template: &Path, worker_type: &str, worker_id: u64) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = template
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    template.with_file_name(format!("{}_{}_{}{}", stem, worker_type, worker_id, ext))
}
