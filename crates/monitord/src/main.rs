//! Resource monitor daemon
//!
//! Loads configuration, connects to the container runtime and hands
//! control to the daemon manager. Detaches from the terminal unless
//! `--foreground` is given.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use monitor_lib::{
    config::LoggingConfig,
    daemon::default_platform,
    notifier::LogNotifier,
    runtime::DockerRuntime,
    DaemonManager, MonitorConfig, StartOutcome,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resource-monitord")]
#[command(version, about = "Container resource monitor daemon", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, env = "RMON_CONFIG")]
    config: Option<PathBuf>,

    /// Stay attached to the terminal instead of daemonizing
    #[arg(long)]
    foreground: bool,
}

/// RUST_LOG wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = MonitorConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging);
    info!(instance = %config.instance_name, "Starting resource-monitord");

    let runtime = DockerRuntime::connect().context("Failed to connect to the container runtime")?;
    let manager = Arc::new(DaemonManager::new(
        config,
        Arc::new(runtime),
        Arc::new(LogNotifier),
        default_platform(),
    ));

    match manager.start(args.foreground).context("Daemon failed")? {
        StartOutcome::AlreadyRunning(pid) => info!(pid = pid, "Resource monitor already running"),
        StartOutcome::Detached => info!("Resource monitor detached to background"),
        StartOutcome::Finished => info!("Resource monitor exited"),
    }

    Ok(())
}
