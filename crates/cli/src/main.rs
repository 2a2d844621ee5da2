//! Container Resource Monitor CLI
//!
//! Starts and stops the monitor daemon, and queries metrics, anomalies,
//! baselines and optimization recommendations over its HTTP API.

mod client;
mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{anomalies, lifecycle, metrics, recommendations, TimeArgs};
use monitor_lib::config::LoggingConfig;
use monitor_lib::MonitorConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Container Resource Monitor CLI
#[derive(Parser)]
#[command(name = "rmon")]
#[command(author, version, about = "CLI for the Container Resource Monitor", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.rmon/config.toml when present)
    #[arg(long, short, env = "RMON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API endpoint URL
    #[arg(long, env = "RMON_API_URL", default_value = "http://127.0.0.1:9465", global = true)]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the monitor daemon
    Start {
        /// Stay attached to the terminal
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Stop the daemon if running, then start it again
    Restart {
        /// Stay attached to the terminal
        #[arg(long)]
        foreground: bool,
    },

    /// Show whether the daemon is running and its last status snapshot
    Status,

    /// Show collected metric series
    Metrics {
        /// Filter by container id
        #[arg(long)]
        container: Option<String>,

        /// Filter by metric type (cpu, memory, disk, network, custom)
        #[arg(long = "type")]
        metric_type: Option<String>,

        #[command(flatten)]
        time: TimeArgs,
    },

    /// Show detected anomalies
    Anomalies {
        /// Filter by container id
        #[arg(long)]
        container: Option<String>,

        /// Filter by metric type (cpu, memory, disk, network, custom)
        #[arg(long = "type")]
        metric_type: Option<String>,

        /// Filter by severity (low, medium, high or 1-3)
        #[arg(long)]
        severity: Option<String>,

        #[command(flatten)]
        time: TimeArgs,
    },

    /// Show current statistical baselines
    Baselines {
        /// Filter by container id
        #[arg(long)]
        container: Option<String>,

        /// Filter by metric type
        #[arg(long = "type")]
        metric_type: Option<String>,
    },

    /// Show optimization recommendations
    Recommendations {
        /// Filter by container id
        #[arg(long)]
        container: Option<String>,

        /// Filter by category (sizing, performance, cost)
        #[arg(long)]
        category: Option<String>,

        /// Filter by resource (cpu, memory, disk, network, general)
        #[arg(long)]
        resource: Option<String>,

        #[command(flatten)]
        time: TimeArgs,
    },

    /// Render the optimization report
    Report {
        /// Limit the report to one container
        #[arg(long)]
        container: Option<String>,

        /// Report format (text, json, html)
        #[arg(long = "format", default_value = "text")]
        report_format: String,

        /// Write the report to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show host-wide container counts and aggregate usage
    System,
}

/// Daemon runs log like `resource-monitord`; everything else only warns
fn init_tracing(command: &Commands, logging: &LoggingConfig) {
    let runs_daemon = matches!(command, Commands::Start { .. } | Commands::Restart { .. });

    if runs_daemon {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
        let registry = tracing_subscriber::registry().with(filter);
        if logging.is_json() {
            registry.with(fmt::layer().json()).init();
        } else {
            registry.with(fmt::layer()).init();
        }
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_query(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;
    let format = cli.format;

    match cli.command {
        Commands::Metrics {
            container,
            metric_type,
            time,
        } => metrics::show_metrics(&client, container, metric_type, &time, format).await,
        Commands::Anomalies {
            container,
            metric_type,
            severity,
            time,
        } => {
            anomalies::show_anomalies(&client, container, metric_type, severity, &time, format)
                .await
        }
        Commands::Baselines {
            container,
            metric_type,
        } => anomalies::show_baselines(&client, container, metric_type, format).await,
        Commands::Recommendations {
            container,
            category,
            resource,
            time,
        } => {
            recommendations::show_recommendations(&client, container, category, resource, &time, format)
                .await
        }
        Commands::Report {
            container,
            report_format,
            output,
        } => recommendations::show_report(&client, container, &report_format, output).await,
        Commands::System => metrics::show_system(&client, format).await,
        Commands::Start { .. } | Commands::Stop | Commands::Restart { .. } | Commands::Status => {
            anyhow::bail!("lifecycle commands do not use the HTTP API")
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = MonitorConfig::load(cli.config.as_deref())?;
    init_tracing(&cli.command, &config.logging);

    // Lifecycle commands may fork, so they run before any async runtime exists
    match cli.command {
        Commands::Start { foreground } => lifecycle::start(config, foreground),
        Commands::Stop => lifecycle::stop(&config),
        Commands::Restart { foreground } => lifecycle::restart(config, foreground),
        Commands::Status => lifecycle::status(&config, cli.format),
        _ => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build async runtime")?
            .block_on(run_query(cli)),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
