//! Out-of-process view of the daemon: PID file, liveness and termination
//!
//! Needs no container runtime, so the CLI can use it for `stop` and
//! `status` without building the components.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::platform::PlatformService;
use super::{pidfile, status, DaemonStatus};
use crate::config::DaemonConfig;
use crate::error::DaemonError;

const TERMINATE_POLL: Duration = Duration::from_millis(100);

pub struct ProcessControl {
    config: DaemonConfig,
    platform: Arc<dyn PlatformService>,
}

impl ProcessControl {
    /// Paths are made absolute up front; a detached daemon runs from `/`.
    pub fn new(mut config: DaemonConfig, platform: Arc<dyn PlatformService>) -> Self {
        config.expand_paths();
        config.pid_file = absolute(&config.pid_file);
        config.log_file = absolute(&config.log_file);
        config.status_file = absolute(&config.status_file);
        Self { config, platform }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn PlatformService> {
        &self.platform
    }

    /// Pid of the live daemon, if any. A stale PID file is removed.
    pub fn running_pid(&self) -> Option<u32> {
        let path = &self.config.pid_file;
        let recorded = match pidfile::read(path) {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(error = %e, "Failed to read PID file");
                return None;
            }
        };

        match recorded {
            Some(pid) if self.platform.is_alive(pid) => Some(pid),
            Some(pid) => {
                info!(pid = pid, path = %path.display(), "Removing stale PID file");
                self.remove_stale(path);
                None
            }
            None => {
                if path.exists() {
                    info!(path = %path.display(), "Removing unreadable PID file");
                    self.remove_stale(path);
                }
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    pub fn write_pid(&self, pid: u32) -> Result<(), DaemonError> {
        pidfile::write(&self.config.pid_file, pid)
    }

    /// Remove the PID file only while it still names `pid`
    pub fn release_pid(&self, pid: u32) -> Result<(), DaemonError> {
        match pidfile::read(&self.config.pid_file)? {
            Some(recorded) if recorded == pid => pidfile::remove(&self.config.pid_file),
            _ => Ok(()),
        }
    }

    /// Ask the running daemon to stop and wait up to `stop_timeout`.
    ///
    /// Returns `Ok(false)` when nothing was running.
    pub fn terminate(&self) -> Result<bool, DaemonError> {
        let Some(pid) = self.running_pid() else {
            return Ok(false);
        };

        info!(pid = pid, "Sending termination signal to daemon");
        self.platform.terminate(pid)?;

        let deadline = Instant::now() + self.config.stop_timeout();
        while Instant::now() < deadline {
            if !self.is_running() {
                info!(pid = pid, "Daemon stopped");
                return Ok(true);
            }
            std::thread::sleep(TERMINATE_POLL);
        }

        if self.is_running() {
            return Err(DaemonError::Terminate {
                pid,
                source: std::io::Error::from(ErrorKind::TimedOut),
            });
        }
        Ok(true)
    }

    /// Last snapshot the daemon persisted
    pub fn read_status(&self) -> Result<Option<DaemonStatus>, DaemonError> {
        status::read(&self.config.status_file)
    }

    pub fn write_status(&self, snapshot: &DaemonStatus) -> Result<(), DaemonError> {
        status::write_atomic(&self.config.status_file, snapshot)
    }

    fn remove_stale(&self, path: &Path) {
        if let Err(e) = pidfile::remove(path) {
            warn!(error = %e, "Failed to remove stale PID file");
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
