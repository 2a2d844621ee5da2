//! Lifecycle tests with an in-process platform

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use super::*;
use crate::models::{CpuMetrics, MetricPayload, MetricSample};
use crate::notifier::RecordingNotifier;
use crate::runtime::StaticRuntime;

/// Reports every pid as alive, standing in for a daemon in another process
struct AlivePlatform;

impl PlatformService for AlivePlatform {
    fn daemonize(&self, _log_file: &Path) -> Result<Detached, DaemonError> {
        Ok(Detached::Daemon)
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, _pid: u32) -> bool {
        true
    }

    fn terminate(&self, _pid: u32) -> Result<(), DaemonError> {
        Ok(())
    }
}

fn test_config(dir: &TempDir) -> MonitorConfig {
    let mut config = MonitorConfig {
        instance_name: "test-host".to_string(),
        ..Default::default()
    };
    config.daemon.pid_file = dir.path().join("daemon.pid");
    config.daemon.status_file = dir.path().join("status.json");
    config.daemon.log_file = dir.path().join("daemon.log");
    config.daemon.api_enabled = false;
    config.daemon.stop_timeout_secs = 1;
    config
}

fn manager_with(config: MonitorConfig, platform: Arc<dyn PlatformService>) -> Arc<DaemonManager> {
    Arc::new(DaemonManager::new(
        config,
        Arc::new(StaticRuntime::new()),
        Arc::new(RecordingNotifier::new()),
        platform,
    ))
}

fn manager(dir: &TempDir) -> Arc<DaemonManager> {
    manager_with(test_config(dir), Arc::new(ForegroundPlatform))
}

#[tokio::test]
async fn test_launch_and_stop() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let pid_file = manager.config().daemon.pid_file.clone();

    manager.launch().await.unwrap();
    assert_eq!(manager.state(), DaemonState::Running);
    assert!(manager.is_running());
    assert_eq!(manager.running_pid(), Some(std::process::id()));
    assert_eq!(
        std::fs::read_to_string(&pid_file).unwrap().trim(),
        std::process::id().to_string()
    );

    let status = manager.process().read_status().unwrap().unwrap();
    assert!(status.running);
    assert_eq!(status.pid, Some(std::process::id()));
    assert!(status.components.metrics_collector.running);
    assert!(status.components.anomaly_detector.running);
    assert!(status.components.optimization_engine.running);

    manager.stop().await;
    assert_eq!(manager.state(), DaemonState::NotRunning);
    assert!(!manager.is_running());
    assert!(!pid_file.exists());
    assert!(!manager.collector().is_running());

    let status = manager.process().read_status().unwrap().unwrap();
    assert!(!status.running);
    assert_eq!(status.pid, None);
    assert!(!status.components.optimization_engine.running);

    // second stop is a no-op
    manager.stop().await;
    assert_eq!(manager.state(), DaemonState::NotRunning);
}

#[tokio::test]
async fn test_second_launch_is_noop() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    manager.launch().await.unwrap();
    manager.launch().await.unwrap();
    assert_eq!(manager.state(), DaemonState::Running);

    manager.stop().await;
}

#[tokio::test]
async fn test_live_foreign_pid_blocks_launch() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(test_config(&dir), Arc::new(AlivePlatform));
    let foreign = std::process::id().wrapping_add(1);
    manager.process().write_pid(foreign).unwrap();

    let err = manager.launch().await.unwrap_err();
    assert!(matches!(err, DaemonError::AlreadyRunning(pid) if pid == foreign));
    assert_eq!(manager.state(), DaemonState::NotRunning);
}

#[tokio::test]
async fn test_stale_pid_file_does_not_block_launch() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    manager
        .process()
        .write_pid(std::process::id().wrapping_add(1))
        .unwrap();

    manager.launch().await.unwrap();
    assert_eq!(manager.running_pid(), Some(std::process::id()));
    manager.stop().await;
}

#[test]
fn test_start_when_running_is_noop() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(test_config(&dir), Arc::new(AlivePlatform));
    manager.process().write_pid(4242).unwrap();

    let outcome = manager.start(true).unwrap();
    assert_eq!(outcome, StartOutcome::AlreadyRunning(4242));
    assert_eq!(manager.state(), DaemonState::NotRunning);
}

#[test]
fn test_foreground_start_runs_until_shutdown_requested() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let pid_file = manager.config().daemon.pid_file.clone();

    let background = Arc::clone(&manager);
    let stopper = std::thread::spawn(move || {
        for _ in 0..100 {
            if background.state() == DaemonState::Running {
                background.request_shutdown();
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        false
    });

    let outcome = manager.start(true).unwrap();
    assert!(stopper.join().unwrap());
    assert_eq!(outcome, StartOutcome::Finished);
    assert_eq!(manager.state(), DaemonState::NotRunning);
    assert!(!pid_file.exists());
}

/// Poll `manager` from another thread, optionally waiting for it to go
/// down first, and request shutdown once it reports Running.
fn shutdown_when_running(
    manager: &Arc<DaemonManager>,
    expect_stop_first: bool,
) -> std::thread::JoinHandle<bool> {
    let manager = Arc::clone(manager);
    std::thread::spawn(move || {
        let tick = std::time::Duration::from_millis(10);
        let mut seen_stop = !expect_stop_first;
        for _ in 0..1000 {
            match manager.state() {
                DaemonState::NotRunning => seen_stop = true,
                DaemonState::Running if seen_stop => {
                    manager.request_shutdown();
                    return true;
                }
                _ => {}
            }
            std::thread::sleep(tick);
        }
        false
    })
}

#[test]
fn test_restart_stops_and_relaunches_in_process_daemon() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let pid_file = manager.config().daemon.pid_file.clone();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(manager.launch()).unwrap();
    assert_eq!(manager.state(), DaemonState::Running);
    assert!(manager.collector().is_running());

    let watcher = shutdown_when_running(&manager, true);
    let outcome = manager.restart(true).unwrap();

    assert!(watcher.join().unwrap(), "daemon never came back up");
    assert_eq!(outcome, StartOutcome::Finished);
    assert_eq!(manager.state(), DaemonState::NotRunning);
    assert!(!manager.collector().is_running());
    assert!(!pid_file.exists());
}

#[test]
fn test_restart_of_stopped_manager_starts_it() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    let watcher = shutdown_when_running(&manager, false);
    let outcome = manager.restart(true).unwrap();

    assert!(watcher.join().unwrap());
    assert_eq!(outcome, StartOutcome::Finished);
    assert_eq!(manager.state(), DaemonState::NotRunning);
}

#[test]
fn test_restart_clears_stale_pid_file() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let pid_file = manager.config().daemon.pid_file.clone();
    manager
        .process()
        .write_pid(std::process::id().wrapping_add(1))
        .unwrap();

    let watcher = shutdown_when_running(&manager, false);
    let outcome = manager.restart(true).unwrap();

    assert!(watcher.join().unwrap());
    assert_eq!(outcome, StartOutcome::Finished);
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn test_restart_inside_runtime_is_rejected() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    assert!(matches!(
        manager.restart(true),
        Err(DaemonError::Unsupported(_))
    ));
    assert_eq!(manager.state(), DaemonState::NotRunning);
}

#[tokio::test]
async fn test_api_bind_failure_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.daemon.api_enabled = true;
    config.daemon.api_bind = "not-an-address".to_string();
    let manager = manager_with(config, Arc::new(ForegroundPlatform));

    let err = manager.launch().await.unwrap_err();
    assert!(matches!(err, DaemonError::ComponentStart { component: "api", .. }));
    assert_eq!(manager.state(), DaemonState::NotRunning);
    assert!(!manager.collector().is_running());
    assert!(!manager.config().daemon.pid_file.exists());
}

#[tokio::test]
async fn test_status_counts_components() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let now = Utc::now();
    manager
        .collector()
        .insert_samples(["a", "b"].iter().map(|id| {
            MetricSample::new(
                *id,
                now,
                MetricPayload::Cpu(CpuMetrics {
                    usage_percent: 10.0,
                    ..Default::default()
                }),
            )
        }))
        .await;

    let status = manager.get_status().await;
    assert!(!status.running);
    assert_eq!(status.uptime, 0);
    assert_eq!(status.components.metrics_collector.containers_monitored, 2);
    assert_eq!(status.components.anomaly_detector.anomalies_detected, 0);
}

#[tokio::test]
async fn test_facade_ignores_malformed_bounds() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let now = Utc::now();
    manager
        .collector()
        .insert_samples((0..3).map(|i| {
            MetricSample::new(
                "c1",
                now - ChronoDuration::hours(i),
                MetricPayload::Cpu(CpuMetrics {
                    usage_percent: 5.0,
                    ..Default::default()
                }),
            )
        }))
        .await;

    let all = manager
        .get_metrics(Some("c1"), Some(MetricType::Cpu), Some("yesterday"), None)
        .await;
    assert_eq!(all["c1"][&MetricType::Cpu].len(), 3);

    let start = (now - ChronoDuration::minutes(90)).to_rfc3339();
    let recent = manager
        .get_metrics(Some("c1"), None, Some(&start), Some("garbage"))
        .await;
    assert_eq!(recent["c1"][&MetricType::Cpu].len(), 2);

    manager.engine().generate_recommendations().await;
    let report = manager.generate_optimization_report(Some("c1"), "pdf").await.unwrap();
    assert!(report.starts_with("Container Resource Optimization Report"));

    let cost = manager
        .get_recommendations(None, Some(Category::Cost), None, None, None)
        .await;
    assert!(!cost["c1"].is_empty());

    assert!(manager
        .get_anomalies(None, None, Some(Severity::High), None, None)
        .await
        .is_empty());
}
