//! Status snapshot persisted for out-of-process inspection

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub running: bool,
    pub containers_monitored: usize,
    pub metrics_collected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub running: bool,
    pub anomalies_detected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub recommendations_generated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatuses {
    pub metrics_collector: CollectorStatus,
    pub anomaly_detector: DetectorStatus,
    pub optimization_engine: EngineStatus,
}

/// Point-in-time daemon health; recomputed on every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Seconds since launch
    pub uptime: u64,
    pub components: ComponentStatuses,
    pub last_updated: DateTime<Utc>,
}

fn status_error(path: &Path, source: std::io::Error) -> DaemonError {
    DaemonError::StatusFile {
        path: path.to_path_buf(),
        source,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write the snapshot next to `path` and rename it into place
pub fn write_atomic(path: &Path, status: &DaemonStatus) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| status_error(path, e))?;
    }
    let body = serde_json::to_vec_pretty(status)
        .map_err(|e| status_error(path, std::io::Error::new(ErrorKind::InvalidData, e)))?;

    let tmp = tmp_path(path);
    fs::write(&tmp, body).map_err(|e| status_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| status_error(path, e))
}

/// Last persisted snapshot, if any
pub fn read(path: &Path) -> Result<Option<DaemonStatus>, DaemonError> {
    match fs::read(path) {
        Ok(body) => serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| status_error(path, std::io::Error::new(ErrorKind::InvalidData, e))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(status_error(path, e)),
    }
}
