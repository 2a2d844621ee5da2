//! Daemon lifecycle commands
//!
//! These act on the PID and status files directly and never need the
//! HTTP API. `start` and `restart` run the daemon inside this process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use monitor_lib::daemon::{default_platform, DaemonStatus, ProcessControl};
use monitor_lib::notifier::LogNotifier;
use monitor_lib::runtime::DockerRuntime;
use monitor_lib::{DaemonManager, MonitorConfig, StartOutcome};
use serde_json::json;
use tabled::Tabled;

use crate::output::{
    color_running, print_info, print_json, print_rows, print_success, print_warning, OutputFormat,
};

/// How long the launching process waits for the daemon's PID file
const STARTUP_WAIT: Duration = Duration::from_secs(5);

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: &'static str,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Counters")]
    counters: String,
}

fn build_manager(config: MonitorConfig) -> Result<Arc<DaemonManager>> {
    let runtime =
        DockerRuntime::connect().context("Failed to connect to the container runtime")?;
    Ok(Arc::new(DaemonManager::new(
        config,
        Arc::new(runtime),
        Arc::new(LogNotifier),
        default_platform(),
    )))
}

fn control(config: &MonitorConfig) -> ProcessControl {
    ProcessControl::new(config.daemon.clone(), default_platform())
}

fn report_outcome(manager: &DaemonManager, outcome: StartOutcome) -> Result<()> {
    match outcome {
        StartOutcome::AlreadyRunning(pid) => {
            print_warning(&format!("Daemon is already running (pid {})", pid));
        }
        StartOutcome::Detached => {
            let deadline = Instant::now() + STARTUP_WAIT;
            while Instant::now() < deadline {
                if let Some(pid) = manager.running_pid() {
                    print_success(&format!("Daemon started (pid {})", pid));
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            anyhow::bail!(
                "Daemon did not come up within {}s; check {}",
                STARTUP_WAIT.as_secs(),
                manager.config().daemon.log_file.display()
            );
        }
        // Foreground run ended, or this is the detached daemon exiting
        StartOutcome::Finished => {}
    }
    Ok(())
}

pub fn start(config: MonitorConfig, foreground: bool) -> Result<()> {
    let manager = build_manager(config)?;
    if foreground {
        print_info("Running in foreground; press Ctrl-C to stop");
    }
    let outcome = manager.start(foreground).context("Failed to start daemon")?;
    report_outcome(&manager, outcome)
}

pub fn stop(config: &MonitorConfig) -> Result<()> {
    if control(config).terminate().context("Failed to stop daemon")? {
        print_success("Daemon stopped");
    } else {
        print_warning("Daemon is not running");
    }
    Ok(())
}

pub fn restart(config: MonitorConfig, foreground: bool) -> Result<()> {
    let manager = build_manager(config)?;
    let outcome = manager
        .restart(foreground)
        .context("Failed to restart daemon")?;
    report_outcome(&manager, outcome)
}

pub fn status(config: &MonitorConfig, format: OutputFormat) -> Result<()> {
    let control = control(config);
    let pid = control.running_pid();
    let snapshot = control.read_status().context("Failed to read status file")?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "running": pid.is_some(),
            "pid": pid,
            "status": snapshot,
        })),
        OutputFormat::Table => {
            match pid {
                Some(pid) => print_success(&format!("Daemon is running (pid {})", pid)),
                None => print_warning("Daemon is not running"),
            }
            match snapshot {
                Some(snapshot) => print_snapshot(&snapshot),
                None => print_info("No status snapshot recorded yet"),
            }
            Ok(())
        }
    }
}

fn print_snapshot(status: &DaemonStatus) {
    let c = &status.components;
    let rows = vec![
        ComponentRow {
            component: "metrics_collector",
            state: color_running(c.metrics_collector.running),
            counters: format!(
                "{} containers, {} samples",
                c.metrics_collector.containers_monitored, c.metrics_collector.metrics_collected
            ),
        },
        ComponentRow {
            component: "anomaly_detector",
            state: color_running(c.anomaly_detector.running),
            counters: format!("{} anomalies", c.anomaly_detector.anomalies_detected),
        },
        ComponentRow {
            component: "optimization_engine",
            state: color_running(c.optimization_engine.running),
            counters: format!(
                "{} recommendations",
                c.optimization_engine.recommendations_generated
            ),
        },
    ];

    println!(
        "Uptime: {}s, last updated {}",
        status.uptime,
        status.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    print_rows(rows, "components");
}
