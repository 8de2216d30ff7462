//! CLI argument parsing for wms-bench

use clap::Parser;
use std::path::PathBuf;

/// Multi-worker warehouse scheduler bench
#[derive(Parser, Debug, Clone)]
#[command(name = "wms-bench")]
#[command(about = "Run regular, planner and reserver workers against one warehouse")]
#[command(version)]
pub struct Cli {
    /// Number of timeslices each regular worker runs
    #[arg(long, default_value = "10")]
    pub timeslices: u32,

    /// Number of regular workers
    #[arg(long, default_value = "4")]
    pub regular_workers: u64,

    /// Number of planner workers
    #[arg(long, default_value = "2")]
    pub planner_workers: u64,

    /// Dump per-worker counters when done
    #[arg(long)]
    pub with_profile: bool,

    /// Profile file template; each worker writes `<stem>_<type>_<id><ext>`
    #[arg(long, default_value = "wms.stats")]
    pub profile_file: PathBuf,

    /// Random sales recorded by each regular worker per timeslice
    #[arg(long, default_value = "10")]
    pub sales_per_timeslice: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// JSON file with worker tuning and the product grid
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["wms-bench"]);
        assert_eq!(cli.timeslices, 10);
        assert_eq!(cli.regular_workers, 4);
        assert_eq!(cli.planner_workers, 2);
        assert!(!cli.with_profile);
        assert_eq!(cli.profile_file, PathBuf::from("wms.stats"));
        assert_eq!(cli.sales_per_timeslice, 10);
        assert_eq!(cli.log_level, "info");
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_custom_values() {
        let cli = Cli::parse_from([
            "wms-bench",
            "--timeslices", "3",
            "--regular-workers", "8",
            "--planner-workers", "1",
            "--with-profile",
            "--profile-file", "/tmp/run.prof",
            "--sales-per-timeslice", "0",
            "--log-level", "debug",
            "--config", "bench.json",
        ]);
        assert_eq!(cli.timeslices, 3);
        assert_eq!(cli.regular_workers, 8);
        assert_eq!(cli.planner_workers, 1);
        assert!(cli.with_profile);
        assert_eq!(cli.profile_file, PathBuf::from("/tmp/run.prof"));
        assert_eq!(cli.sales_per_timeslice, 0);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.config, Some(PathBuf::from("bench.json")));
    }
}
