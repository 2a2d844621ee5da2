//! OS process services used by the daemon lifecycle
//!
//! Daemonization, liveness probing and termination sit behind
//! [`PlatformService`] so the lifecycle can run in-process in tests and on
//! targets without `fork`.

use std::path::Path;

use tracing::debug;

use crate::error::DaemonError;

/// Which side of a detach the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The launching process; it should return without running the daemon
    Parent,
    /// The process that runs the daemon
    Daemon,
}

pub trait PlatformService: Send + Sync {
    /// Detach from the controlling terminal and redirect standard streams
    /// to `log_file`.
    fn daemonize(&self, log_file: &Path) -> Result<Detached, DaemonError>;

    fn current_pid(&self) -> u32;

    /// Existence probe; delivers no signal to the target
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask a process to shut down
    fn terminate(&self, pid: u32) -> Result<(), DaemonError>;
}

/// Double-fork daemonization with POSIX signals
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixPlatform;

#[cfg(unix)]
impl PosixPlatform {
    fn redirect_streams(log_file: &Path) -> std::io::Result<()> {
        use std::fs::OpenOptions;
        use std::os::unix::io::AsRawFd;

        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let null = OpenOptions::new().read(true).open("/dev/null")?;
        let log = OpenOptions::new().create(true).append(true).open(log_file)?;

        // SAFETY: dup2 on descriptors owned by this process
        unsafe {
            if libc::dup2(null.as_raw_fd(), libc::STDIN_FILENO) == -1
                || libc::dup2(log.as_raw_fd(), libc::STDOUT_FILENO) == -1
                || libc::dup2(log.as_raw_fd(), libc::STDERR_FILENO) == -1
            {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
impl PlatformService for PosixPlatform {
    fn daemonize(&self, log_file: &Path) -> Result<Detached, DaemonError> {
        // SAFETY: called before any runtime or worker thread is started
        unsafe {
            match libc::fork() {
                -1 => return Err(DaemonError::Daemonize(std::io::Error::last_os_error())),
                0 => {}
                _ => return Ok(Detached::Parent),
            }

            if libc::setsid() < 0 {
                return Err(DaemonError::Daemonize(std::io::Error::last_os_error()));
            }

            match libc::fork() {
                -1 => return Err(DaemonError::Daemonize(std::io::Error::last_os_error())),
                0 => {}
                _ => libc::_exit(0),
            }

            libc::umask(0o027);
        }

        std::env::set_current_dir("/").map_err(DaemonError::Daemonize)?;
        Self::redirect_streams(log_file).map_err(DaemonError::Daemonize)?;
        debug!(pid = std::process::id(), "Detached from terminal");
        Ok(Detached::Daemon)
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 only checks for existence
        let result = unsafe { libc::kill(pid, 0) };
        result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn terminate(&self, pid: u32) -> Result<(), DaemonError> {
        let raw = i32::try_from(pid).map_err(|_| DaemonError::Terminate {
            pid,
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        })?;
        // SAFETY: plain signal delivery
        let result = unsafe { libc::kill(raw, libc::SIGTERM) };
        if result != 0 {
            return Err(DaemonError::Terminate {
                pid,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

/// In-process stand-in: never forks and only knows its own process
#[derive(Debug, Default, Clone, Copy)]
pub struct ForegroundPlatform;

impl PlatformService for ForegroundPlatform {
    fn daemonize(&self, _log_file: &Path) -> Result<Detached, DaemonError> {
        Ok(Detached::Daemon)
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid == std::process::id()
    }

    fn terminate(&self, _pid: u32) -> Result<(), DaemonError> {
        Err(DaemonError::Unsupported("terminate"))
    }
}

/// Platform service for the current target
pub fn default_platform() -> std::sync::Arc<dyn PlatformService> {
    #[cfg(unix)]
    {
        std::sync::Arc::new(PosixPlatform)
    }
    #[cfg(not(unix))]
    {
        std::sync::Arc::new(ForegroundPlatform)
    }
}
