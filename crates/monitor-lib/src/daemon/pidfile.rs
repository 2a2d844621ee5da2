//! PID file handling

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::DaemonError;

fn pid_error(path: &Path, source: std::io::Error) -> DaemonError {
    DaemonError::PidFile {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the recorded pid.
///
/// A missing file is `Ok(None)`. Content that is not a pid is also
/// `Ok(None)`, leaving the caller to treat the file as stale.
pub fn read(path: &Path) -> Result<Option<u32>, DaemonError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(pid_error(path, e)),
    }
}

pub fn write(path: &Path, pid: u32) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| pid_error(path, e))?;
    }
    fs::write(path, format!("{}\n", pid)).map_err(|e| pid_error(path, e))
}

/// Delete the file; a missing file is not an error
pub fn remove(path: &Path) -> Result<(), DaemonError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(pid_error(path, e)),
    }
}

/// Removes the PID file on drop if it still names `pid`
pub struct PidFileGuard {
    path: PathBuf,
    pid: u32,
}

impl PidFileGuard {
    pub fn new(path: impl Into<PathBuf>, pid: u32) -> Self {
        Self {
            path: path.into(),
            pid,
        }
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if matches!(read(&self.path), Ok(Some(pid)) if pid == self.pid) {
            if let Err(e) = remove(&self.path) {
                warn!(error = %e, "Failed to remove PID file on exit");
            }
        }
    }
}
