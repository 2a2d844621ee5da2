//! Container resource monitor library
//!
//! This crate provides the core functionality for:
//! - Metrics collection from the container runtime
//! - Statistical anomaly detection with alert cooldown
//! - Rule-based optimization recommendations and reports
//! - The daemon lifecycle, its HTTP query API and observability

pub mod anomaly;
pub mod api;
pub mod collector;
pub mod config;
pub mod daemon;
pub mod error;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod optimizer;
pub mod query;
pub mod runtime;
pub mod worker;

pub use config::MonitorConfig;
pub use daemon::{DaemonManager, DaemonState, DaemonStatus, StartOutcome};
pub use error::{CollectorError, DaemonError, DetectionError, FilterParseError, OptimizationError};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
