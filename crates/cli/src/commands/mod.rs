//! Subcommand implementations

pub mod anomalies;
pub mod lifecycle;
pub mod metrics;
pub mod recommendations;

use clap::Args;

/// ISO-8601 time bounds; the daemon ignores a bound it cannot parse
#[derive(Debug, Clone, Default, Args)]
pub struct TimeArgs {
    /// Earliest timestamp to include (e.g. 2024-05-01T12:00:00Z)
    #[arg(long)]
    pub start_time: Option<String>,

    /// Latest timestamp to include
    #[arg(long)]
    pub end_time: Option<String>,
}
