//! Daemon lifecycle for the resource monitor
//!
//! This module provides:
//! - `DaemonManager`, which owns the collector, detector and engine and
//!   drives them through NotRunning -> Starting -> Running -> Stopping
//! - PID file bookkeeping with stale-file self-healing
//! - A periodic status snapshot written atomically to disk
//! - Signal-driven shutdown and the HTTP query API
//! - A read-only query facade taking ISO-8601 time bounds as strings

mod pidfile;
pub mod platform;
mod process;
mod status;

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::anomaly::{AnomaliesByContainer, AnomalyDetector, AnomalyFilter, BaselinesByContainer};
use crate::api;
use crate::collector::{MetricsCollector, SystemMetrics};
use crate::config::MonitorConfig;
use crate::error::{CollectorError, DaemonError, OptimizationError};
use crate::models::{MetricType, MetricsByContainer, Severity};
use crate::notifier::Notifier;
use crate::observability::StructuredLogger;
use crate::optimizer::{
    Category, OptimizationEngine, RecommendationFilter, RecommendationsByContainer, ReportFormat,
    Resource,
};
use crate::query::TimeRange;
use crate::runtime::ContainerRuntime;
use crate::worker::PeriodicWorker;

pub use pidfile::PidFileGuard;
pub use platform::{default_platform, Detached, ForegroundPlatform, PlatformService};
#[cfg(unix)]
pub use platform::PosixPlatform;
pub use process::ProcessControl;
pub use status::{CollectorStatus, ComponentStatuses, DaemonStatus, DetectorStatus, EngineStatus};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wait before retrying after a failed status write
const STATUS_BACKOFF: Duration = Duration::from_secs(60);

/// Pause between stopping and starting again on restart
const RESTART_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    NotRunning,
    Starting,
    Running,
    Stopping,
}

/// What a call to [`DaemonManager::start`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Another live process already owns the PID file
    AlreadyRunning(u32),
    /// This is the launching process; the daemon continues in a child
    Detached,
    /// The daemon ran in this process and has shut down
    Finished,
}

struct ApiHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

pub struct DaemonManager {
    config: MonitorConfig,
    process: ProcessControl,
    collector: Arc<MetricsCollector>,
    detector: Arc<AnomalyDetector>,
    engine: Arc<OptimizationEngine>,
    state: Mutex<DaemonState>,
    started_at: Mutex<Option<Instant>>,
    shutdown: watch::Sender<bool>,
    status_worker: PeriodicWorker,
    api: Mutex<Option<ApiHandle>>,
    logger: StructuredLogger,
}

impl DaemonManager {
    /// Build the components; nothing runs until `start` or `launch`.
    pub fn new(
        mut config: MonitorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
        platform: Arc<dyn PlatformService>,
    ) -> Self {
        let process = ProcessControl::new(config.daemon.clone(), platform);
        config.daemon = process.config().clone();

        let collector = Arc::new(MetricsCollector::new(runtime, config.metrics.clone()));
        let detector = Arc::new(AnomalyDetector::new(
            Arc::clone(&collector),
            notifier,
            config.anomaly.clone(),
            &config.instance_name,
        ));
        let engine = Arc::new(OptimizationEngine::new(
            Arc::clone(&collector),
            config.optimization.clone(),
            &config.instance_name,
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            logger: StructuredLogger::new(&config.instance_name),
            config,
            process,
            collector,
            detector,
            engine,
            state: Mutex::new(DaemonState::NotRunning),
            started_at: Mutex::new(None),
            shutdown,
            status_worker: PeriodicWorker::new("status"),
            api: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn detector(&self) -> &Arc<AnomalyDetector> {
        &self.detector
    }

    pub fn engine(&self) -> &Arc<OptimizationEngine> {
        &self.engine
    }

    pub fn process(&self) -> &ProcessControl {
        &self.process
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: DaemonState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Move to `next` only from one of `from`
    fn transition(&self, from: &[DaemonState], next: DaemonState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if from.contains(&state) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Run the daemon until a signal or [`request_shutdown`](Self::request_shutdown).
    ///
    /// Must be called outside any tokio runtime: unless `foreground` is set
    /// the process is detached first, and the runtime is built afterwards.
    pub fn start(self: &Arc<Self>, foreground: bool) -> Result<StartOutcome, DaemonError> {
        if let Some(pid) = self.process.running_pid() {
            info!(pid = pid, "Daemon already running");
            return Ok(StartOutcome::AlreadyRunning(pid));
        }

        if !foreground {
            let side = self
                .process
                .platform()
                .daemonize(&self.config.daemon.log_file)?;
            if side == Detached::Parent {
                return Ok(StartOutcome::Detached);
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(DaemonError::Runtime)?;

        runtime.block_on(self.run())?;
        Ok(StartOutcome::Finished)
    }

    async fn run(self: &Arc<Self>) -> Result<(), DaemonError> {
        self.launch().await?;
        let _guard = PidFileGuard::new(
            &self.config.daemon.pid_file,
            self.process.platform().current_pid(),
        );

        match self.run_until_shutdown().await {
            Ok(reason) => {
                self.shutdown_with(reason).await;
                Ok(())
            }
            Err(e) => {
                self.shutdown_with("signal handler failure").await;
                Err(e)
            }
        }
    }

    /// Start every component on the current runtime without blocking.
    ///
    /// Fails with `AlreadyRunning` when another live process owns the PID
    /// file. A component that fails to start rolls the others back.
    pub async fn launch(self: &Arc<Self>) -> Result<(), DaemonError> {
        let pid = self.process.platform().current_pid();
        if let Some(other) = self.process.running_pid() {
            if other != pid {
                return Err(DaemonError::AlreadyRunning(other));
            }
        }

        if !self.transition(&[DaemonState::NotRunning], DaemonState::Starting) {
            info!(state = ?self.state(), "Daemon already started");
            return Ok(());
        }

        self.shutdown.send_replace(false);
        if let Err(e) = self.process.write_pid(pid) {
            self.set_state(DaemonState::NotRunning);
            return Err(e);
        }
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        self.collector.start();
        self.detector.start_detection();
        self.engine.start_analysis();

        if self.config.daemon.api_enabled {
            if let Err(e) = self.start_api().await {
                self.shutdown_with("component start failure").await;
                return Err(e);
            }
        }

        self.start_status_loop();
        self.set_state(DaemonState::Running);
        self.logger.log_startup(MONITOR_VERSION, pid);

        if let Err(e) = self.write_status().await {
            warn!(error = %e, "Failed to write initial status snapshot");
        }
        Ok(())
    }

    async fn start_api(self: &Arc<Self>) -> Result<(), DaemonError> {
        let bind = &self.config.daemon.api_bind;
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| DaemonError::ComponentStart {
                component: "api",
                message: format!("bind {}: {}", bind, e),
            })?;

        let router = api::create_router(Arc::clone(self));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let signal = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = api::serve(listener, router, signal).await {
                warn!(error = %e, "API server exited with error");
            }
        });

        *self.api.lock().unwrap_or_else(|e| e.into_inner()) = Some(ApiHandle { shutdown, join });
        Ok(())
    }

    async fn stop_api(&self, timeout: Duration) {
        let handle = self.api.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.shutdown.send(());
        if tokio::time::timeout(timeout, handle.join).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "API server did not stop in time");
        }
    }

    fn start_status_loop(self: &Arc<Self>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        self.status_worker.start(
            self.config.daemon.status_interval(),
            STATUS_BACKOFF,
            move || {
                let manager = manager.upgrade();
                async move {
                    if let Some(manager) = manager {
                        manager.write_status().await?;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            },
        );
    }

    /// Wait for SIGINT, SIGTERM or an in-process shutdown request
    pub async fn run_until_shutdown(&self) -> Result<&'static str, DaemonError> {
        let mut requested = self.shutdown.subscribe();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(DaemonError::Signal)?;
                Ok("SIGINT received")
            }
            result = terminate_signal() => {
                result?;
                Ok("SIGTERM received")
            }
            _ = requested.wait_for(|stop| *stop) => Ok("shutdown requested"),
        }
    }

    /// Wake [`run_until_shutdown`](Self::run_until_shutdown)
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop every component and release the PID file; idempotent
    pub async fn stop(&self) {
        self.shutdown_with("stop requested").await;
    }

    async fn shutdown_with(&self, reason: &str) {
        if !self.transition(
            &[DaemonState::Running, DaemonState::Starting],
            DaemonState::Stopping,
        ) {
            return;
        }
        self.logger.log_shutdown(reason);

        let timeout = self.config.daemon.stop_timeout();
        self.status_worker.stop(timeout).await;
        self.stop_api(timeout).await;
        self.engine.stop_analysis(timeout).await;
        self.detector.stop_detection(timeout).await;
        self.collector.stop(timeout).await;

        if let Err(e) = self.write_status().await {
            warn!(error = %e, "Failed to write final status snapshot");
        }
        if let Err(e) = self
            .process
            .release_pid(self.process.platform().current_pid())
        {
            warn!(error = %e, "Failed to remove PID file");
        }

        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_state(DaemonState::NotRunning);
        self.request_shutdown();
    }

    /// Stop the daemon, pause, then start again.
    ///
    /// Components running in this process are stopped in place; a daemon
    /// in another process is signalled through its PID file. Like `start`,
    /// this must be called outside any tokio runtime.
    pub fn restart(self: &Arc<Self>, foreground: bool) -> Result<StartOutcome, DaemonError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(DaemonError::Unsupported("restart from inside an async runtime"));
        }

        let own_pid = self.process.platform().current_pid();
        if matches!(self.state(), DaemonState::Running | DaemonState::Starting) {
            info!("Stopping in-process daemon for restart");
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(DaemonError::Runtime)?
                .block_on(self.stop());
        } else if let Some(pid) = self.process.running_pid() {
            if pid == own_pid {
                // Left behind by an earlier run of this process
                self.process.release_pid(own_pid)?;
            } else {
                self.process.terminate()?;
            }
        }

        std::thread::sleep(RESTART_PAUSE);
        self.start(foreground)
    }

    /// Signal the daemon named by the PID file and wait for it to exit
    pub fn terminate(&self) -> Result<bool, DaemonError> {
        self.process.terminate()
    }

    /// True while the PID file names a live process
    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    pub fn running_pid(&self) -> Option<u32> {
        self.process.running_pid()
    }

    /// Snapshot of this process's components
    pub async fn get_status(&self) -> DaemonStatus {
        let running = self.state() == DaemonState::Running;
        let uptime = self
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);

        DaemonStatus {
            running,
            pid: running.then(|| self.process.platform().current_pid()),
            uptime,
            components: ComponentStatuses {
                metrics_collector: CollectorStatus {
                    running: self.collector.is_running(),
                    containers_monitored: self.collector.containers_monitored().await,
                    metrics_collected: self.collector.metrics_collected(),
                },
                anomaly_detector: DetectorStatus {
                    running: self.detector.is_running(),
                    anomalies_detected: self.detector.anomalies_detected(),
                },
                optimization_engine: EngineStatus {
                    running: self.engine.is_running(),
                    recommendations_generated: self.engine.recommendations_generated(),
                },
            },
            last_updated: Utc::now(),
        }
    }

    async fn write_status(&self) -> Result<(), DaemonError> {
        let snapshot = self.get_status().await;
        self.process.write_status(&snapshot)
    }

    pub async fn get_metrics(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> MetricsByContainer {
        let range = TimeRange::parse_lenient(start_time, end_time);
        self.collector.get_metrics(container_id, metric_type, range).await
    }

    pub async fn get_anomalies(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
        severity: Option<Severity>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> AnomaliesByContainer {
        let filter = AnomalyFilter {
            container_id: container_id.map(str::to_string),
            metric_type,
            range: TimeRange::parse_lenient(start_time, end_time),
            severity,
        };
        self.detector.get_anomalies(&filter).await
    }

    pub async fn get_baselines(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
    ) -> BaselinesByContainer {
        self.detector.get_baselines(container_id, metric_type).await
    }

    pub async fn get_recommendations(
        &self,
        container_id: Option<&str>,
        category: Option<Category>,
        resource: Option<Resource>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> RecommendationsByContainer {
        let filter = RecommendationFilter {
            container_id: container_id.map(str::to_string),
            category,
            resource,
            range: TimeRange::parse_lenient(start_time, end_time),
        };
        self.engine.get_recommendations(&filter).await
    }

    /// `format` is `text`, `json` or `html`; anything else renders text
    pub async fn generate_optimization_report(
        &self,
        container_id: Option<&str>,
        format: &str,
    ) -> Result<String, OptimizationError> {
        self.engine
            .generate_optimization_report(container_id, ReportFormat::from(format))
            .await
    }

    pub async fn get_system_metrics(&self) -> Result<SystemMetrics, CollectorError> {
        self.collector.get_system_metrics().await
    }
}

#[cfg(unix)]
async fn terminate_signal() -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate_signal() -> Result<(), DaemonError> {
    std::future::pending().await
}

#[cfg(test)]
mod tests;
