//! Container runtime abstraction
//!
//! The collector only needs four capabilities from the container engine:
//! - enumerate containers (running or all)
//! - fetch a one-shot stats snapshot
//! - execute a command inside a container
//! - read container labels and environment
//!
//! Stats are decoded into [`RawStats`], a serde mirror of the engine's stats
//! document, so extraction never depends on a particular client library.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;
use crate::models::ContainerInfo;

pub mod docker;
pub mod memory;

pub use docker::DockerRuntime;
pub use memory::StaticRuntime;

/// Capability set consumed from the container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers; `all = false` returns only running ones
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>, CollectorError>;

    /// Fetch a single stats snapshot
    async fn stats(&self, container_id: &str) -> Result<RawStats, CollectorError>;

    /// Run a command inside the container and capture stdout
    async fn exec(&self, container_id: &str, command: &[String]) -> Result<ExecOutput, CollectorError>;

    /// Read labels and environment
    async fn inspect(&self, container_id: &str) -> Result<ContainerAttrs, CollectorError>;
}

/// Result of an in-container command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i64>,
    pub stdout: String,
}

/// Container attributes used by custom metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAttrs {
    pub labels: BTreeMap<String, String>,
    /// `NAME=value` entries as reported by the engine
    pub env: Vec<String>,
}

/// One-shot stats document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    #[serde(default)]
    pub cpu_stats: Option<RawCpuStats>,
    #[serde(default)]
    pub precpu_stats: Option<RawCpuStats>,
    #[serde(default)]
    pub memory_stats: Option<RawMemoryStats>,
    #[serde(default)]
    pub blkio_stats: Option<RawBlkioStats>,
    #[serde(default)]
    pub networks: Option<HashMap<String, RawNetworkStats>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCpuStats {
    #[serde(default)]
    pub cpu_usage: Option<RawCpuUsage>,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
    #[serde(default)]
    pub throttling_data: Option<RawThrottlingData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCpuUsage {
    #[serde(default)]
    pub total_usage: Option<u64>,
    #[serde(default)]
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawThrottlingData {
    #[serde(default)]
    pub periods: Option<u64>,
    #[serde(default)]
    pub throttled_periods: Option<u64>,
    #[serde(default)]
    pub throttled_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMemoryStats {
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub stats: Option<HashMap<String, u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlkioStats {
    #[serde(default)]
    pub io_service_bytes_recursive: Option<Vec<RawBlkioEntry>>,
    #[serde(default)]
    pub io_serviced_recursive: Option<Vec<RawBlkioEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlkioEntry {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub value: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNetworkStats {
    #[serde(default)]
    pub rx_bytes: Option<u64>,
    #[serde(default)]
    pub tx_bytes: Option<u64>,
    #[serde(default)]
    pub rx_packets: Option<u64>,
    #[serde(default)]
    pub tx_packets: Option<u64>,
    #[serde(default)]
    pub rx_errors: Option<u64>,
    #[serde(default)]
    pub tx_errors: Option<u64>,
    #[serde(default)]
    pub rx_dropped: Option<u64>,
    #[serde(default)]
    pub tx_dropped: Option<u64>,
}
