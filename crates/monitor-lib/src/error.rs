//! Error taxonomy for the monitor components
//!
//! Per-container and per-pair failures (`CollectorError`, `DetectionError`,
//! `OptimizationError`) are recovered inside the worker loops and logged.
//! `DaemonError` is fatal to lifecycle calls and surfaces to the caller.
//! `FilterParseError` is recovered by treating the filter as unset.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::MetricType;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to enumerate containers: {0}")]
    Enumeration(String),

    #[error("failed to fetch stats for container {container_id}: {message}")]
    Stats {
        container_id: String,
        message: String,
    },

    #[error("exec in container {container_id} failed: {message}")]
    Exec {
        container_id: String,
        message: String,
    },

    #[error("failed to inspect container {container_id}: {message}")]
    Inspect {
        container_id: String,
        message: String,
    },

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("not enough data for {metric_type} baseline of {container_id}: {count} samples")]
    InsufficientData {
        container_id: String,
        metric_type: MetricType,
        count: usize,
    },

    #[error("non-finite value in {metric_type} series of {container_id}")]
    NonFinite {
        container_id: String,
        metric_type: MetricType,
    },
}

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("invalid metrics summary for {container_id}: {reason}")]
    InvalidSummary {
        container_id: String,
        reason: String,
    },

    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is already running with pid {0}")]
    AlreadyRunning(u32),

    #[error("failed to daemonize: {0}")]
    Daemonize(#[source] std::io::Error),

    #[error("pid file {}: {source}", .path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("status file {}: {source}", .path.display())]
    StatusFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to start {component}: {message}")]
    ComponentStart {
        component: &'static str,
        message: String,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("failed to signal process {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("operation not supported on this platform: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("invalid ISO-8601 timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}
