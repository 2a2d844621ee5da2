//! Core data models for the resource monitor

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilterParseError;

/// Category of a collected metric sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Cpu,
    Memory,
    Disk,
    Network,
    Custom,
}

impl MetricType {
    pub const ALL: [MetricType; 5] = [
        MetricType::Cpu,
        MetricType::Memory,
        MetricType::Disk,
        MetricType::Network,
        MetricType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
            MetricType::Disk => "disk",
            MetricType::Network => "network",
            MetricType::Custom => "custom",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FilterParseError::UnknownVariant {
                kind: "metric type",
                value: s.to_string(),
            })
    }
}

/// CPU usage derived from two consecutive stat snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage_percent: f64,
    pub total_usage: u64,
    pub system_usage: u64,
    pub online_cpus: u32,
    pub throttling_periods: u64,
    pub throttled_periods: u64,
    pub throttled_time: u64,
}

/// Memory usage with and without page cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub usage: u64,
    pub limit: u64,
    pub usage_percent: f64,
    pub cache: u64,
    pub usage_actual: u64,
    pub usage_percent_actual: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_anon: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_anon: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_file: Option<u64>,
}

/// Block I/O totals summed over all devices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Counters for a single network interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

/// Network totals plus a per-interface breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub interfaces: BTreeMap<String, InterfaceCounters>,
}

/// Typed payload of a metric sample, one variant per metric category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MetricPayload {
    Cpu(CpuMetrics),
    Memory(MemoryMetrics),
    Disk(DiskMetrics),
    Network(NetworkMetrics),
    Custom(BTreeMap<String, String>),
}

impl MetricPayload {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricPayload::Cpu(_) => MetricType::Cpu,
            MetricPayload::Memory(_) => MetricType::Memory,
            MetricPayload::Disk(_) => MetricType::Disk,
            MetricPayload::Network(_) => MetricType::Network,
            MetricPayload::Custom(_) => MetricType::Custom,
        }
    }

    /// Scalar used for baselines: usage percent for cpu/memory, combined
    /// bytes for disk/network, first numeric value for custom metrics.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            MetricPayload::Cpu(cpu) => Some(cpu.usage_percent),
            MetricPayload::Memory(mem) => Some(mem.usage_percent),
            MetricPayload::Disk(disk) => {
                Some(disk.read_bytes.saturating_add(disk.write_bytes) as f64)
            }
            MetricPayload::Network(net) => Some(net.rx_bytes.saturating_add(net.tx_bytes) as f64),
            MetricPayload::Custom(values) => values
                .values()
                .find_map(|v| v.trim().parse::<f64>().ok().filter(|x| x.is_finite())),
        }
    }

    /// Flat `(name, value)` pairs for tabular export
    pub fn fields(&self) -> Vec<(String, String)> {
        fn pairs(items: &[(&str, String)]) -> Vec<(String, String)> {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect()
        }

        match self {
            MetricPayload::Cpu(c) => pairs(&[
                ("usage_percent", c.usage_percent.to_string()),
                ("total_usage", c.total_usage.to_string()),
                ("system_usage", c.system_usage.to_string()),
                ("online_cpus", c.online_cpus.to_string()),
                ("throttling_periods", c.throttling_periods.to_string()),
                ("throttled_periods", c.throttled_periods.to_string()),
                ("throttled_time", c.throttled_time.to_string()),
            ]),
            MetricPayload::Memory(m) => {
                let mut out = pairs(&[
                    ("usage", m.usage.to_string()),
                    ("limit", m.limit.to_string()),
                    ("usage_percent", m.usage_percent.to_string()),
                    ("cache", m.cache.to_string()),
                    ("usage_actual", m.usage_actual.to_string()),
                    ("usage_percent_actual", m.usage_percent_actual.to_string()),
                ]);
                let optional = [
                    ("rss", m.rss),
                    ("swap", m.swap),
                    ("active_anon", m.active_anon),
                    ("inactive_anon", m.inactive_anon),
                    ("active_file", m.active_file),
                    ("inactive_file", m.inactive_file),
                ];
                out.extend(
                    optional
                        .into_iter()
                        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.to_string()))),
                );
                out
            }
            MetricPayload::Disk(d) => pairs(&[
                ("read_bytes", d.read_bytes.to_string()),
                ("write_bytes", d.write_bytes.to_string()),
                ("read_ops", d.read_ops.to_string()),
                ("write_ops", d.write_ops.to_string()),
            ]),
            MetricPayload::Network(n) => pairs(&[
                ("rx_bytes", n.rx_bytes.to_string()),
                ("tx_bytes", n.tx_bytes.to_string()),
                ("rx_packets", n.rx_packets.to_string()),
                ("tx_packets", n.tx_packets.to_string()),
                ("rx_errors", n.rx_errors.to_string()),
                ("tx_errors", n.tx_errors.to_string()),
                ("rx_dropped", n.rx_dropped.to_string()),
                ("tx_dropped", n.tx_dropped.to_string()),
            ]),
            MetricPayload::Custom(values) => values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// One immutable observation for a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub container_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: MetricPayload,
}

impl MetricSample {
    pub fn new(container_id: impl Into<String>, timestamp: DateTime<Utc>, payload: MetricPayload) -> Self {
        Self {
            container_id: container_id.into(),
            timestamp,
            payload,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        self.payload.metric_type()
    }
}

/// Nested query result: container id -> metric type -> samples in time order
pub type MetricsByContainer = BTreeMap<String, BTreeMap<MetricType, Vec<MetricSample>>>;

/// Lifecycle state reported by the container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Paused,
    Stopped,
}

/// Container as listed by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
}

/// Ordinal 1-3 classification of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Severity {
    /// Clamp an arbitrary level into the 1..=3 range
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=1 => Severity::Low,
            2 => Severity::Medium,
            _ => Severity::High,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s.level()
    }
}

impl TryFrom<u8> for Severity {
    type Error = FilterParseError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Severity::Low),
            2 => Ok(Severity::Medium),
            3 => Ok(Severity::High),
            other => Err(FilterParseError::UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

impl FromStr for Severity {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FilterParseError::UnknownVariant {
            kind: "severity",
            value: s.to_string(),
        };
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => other
                .parse::<u8>()
                .map_err(|_| invalid())
                .and_then(|v| Severity::try_from(v).map_err(|_| invalid())),
        }
    }
}

/// First twelve characters of a container id, as shown by the runtime CLI
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
