//! Configuration types for wms-bench

use serde::Deserialize;
use std::path::Path;
use wms_domain::SeedConfig;
use wms_scheduler::ReadinessStrategy;
use wms_worker::ContinuousConfig;

/// Bench tuning read from `--config`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchConfig {
    /// Idle backoff of planners and reservers
    #[serde(default)]
    pub continuous: ContinuousConfig,
    /// How regular workers find ready operations
    #[serde(default)]
    pub readiness: ReadinessStrategy,
    /// Product grid installed before the run
    #[serde(default)]
    pub seed: SeedConfig,
    /// Base of the per-worker seller random seeds
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
}

fn default_rng_seed() -> u64 {
    0x5eed
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            continuous: ContinuousConfig::default(),
            readiness: ReadinessStrategy::default(),
            seed: SeedConfig::default(),
            rng_seed: default_rng_seed(),
        }
    }
}

/// Load bench configuration from a JSON file
pub fn load_config_file(path: &Path) -> anyhow::Result<BenchConfig> {
    tracing::info!("Loading bench config from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let config: BenchConfig = serde_json::from_str(&content)?;
    Ok(config)
}
