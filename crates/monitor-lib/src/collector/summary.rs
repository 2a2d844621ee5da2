//! Per-container and host-wide aggregates over stored samples

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MetricPayload, MetricSample, MetricType};

/// Average/current/min/max of a usage percentage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub average_usage_percent: f64,
    pub current: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSummary {
    pub read_rate_bytes_per_sec: Option<f64>,
    pub write_rate_bytes_per_sec: Option<f64>,
    pub total_read_bytes: u64,
    pub total_write_bytes: u64,
}

impl DiskSummary {
    /// Combined read+write rate, when both rates are known
    pub fn combined_rate(&self) -> Option<f64> {
        Some(self.read_rate_bytes_per_sec? + self.write_rate_bytes_per_sec?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub rx_rate_bytes_per_sec: Option<f64>,
    pub tx_rate_bytes_per_sec: Option<f64>,
    pub total_rx_bytes: u64,
    pub total_tx_bytes: u64,
}

impl NetworkSummary {
    /// Combined rx+tx rate, when both rates are known
    pub fn combined_rate(&self) -> Option<f64> {
        Some(self.rx_rate_bytes_per_sec? + self.tx_rate_bytes_per_sec?)
    }
}

/// Aggregate view of one container's recent samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub container_id: String,
    pub cpu: Option<UsageSummary>,
    pub memory: Option<UsageSummary>,
    /// Latest reported memory limit in bytes
    pub memory_limit: Option<u64>,
    pub disk: Option<DiskSummary>,
    pub network: Option<NetworkSummary>,
}

/// Container counts by runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCounts {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
}

/// Host-wide snapshot across all monitored containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub containers: ContainerCounts,
    pub cpu_average_usage_percent: Option<f64>,
    pub memory_average_usage_percent: Option<f64>,
    pub disk_read_rate_bytes_per_sec: f64,
    pub disk_write_rate_bytes_per_sec: f64,
    pub network_rx_rate_bytes_per_sec: f64,
    pub network_tx_rate_bytes_per_sec: f64,
}

fn usage_summary(values: &[f64]) -> Option<UsageSummary> {
    let current = *values.last()?;
    let sum: f64 = values.iter().sum();
    Some(UsageSummary {
        average_usage_percent: sum / values.len() as f64,
        current,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Per-second change between the first and last point of a counter
fn rate(points: &[(DateTime<Utc>, u64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let (first_ts, first) = points.first()?;
    let (last_ts, last) = points.last()?;
    let elapsed = (*last_ts - *first_ts).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return None;
    }
    Some((*last as f64 - *first as f64) / elapsed)
}

fn samples(by_type: &BTreeMap<MetricType, Vec<MetricSample>>, t: MetricType) -> &[MetricSample] {
    by_type.get(&t).map(Vec::as_slice).unwrap_or(&[])
}

/// Summarize one container's samples; `None` when nothing is stored.
pub fn summarize(
    container_id: &str,
    by_type: &BTreeMap<MetricType, Vec<MetricSample>>,
) -> Option<ContainerSummary> {
    if by_type.values().all(Vec::is_empty) {
        return None;
    }

    let cpu_values: Vec<f64> = samples(by_type, MetricType::Cpu)
        .iter()
        .filter_map(|s| match &s.payload {
            MetricPayload::Cpu(c) => Some(c.usage_percent),
            _ => None,
        })
        .collect();

    let memory: Vec<(f64, u64)> = samples(by_type, MetricType::Memory)
        .iter()
        .filter_map(|s| match &s.payload {
            MetricPayload::Memory(m) => Some((m.usage_percent, m.limit)),
            _ => None,
        })
        .collect();
    let memory_values: Vec<f64> = memory.iter().map(|(pct, _)| *pct).collect();
    let memory_limit = memory.last().map(|(_, limit)| *limit).filter(|l| *l > 0);

    let disk_points: Vec<(DateTime<Utc>, u64, u64)> = samples(by_type, MetricType::Disk)
        .iter()
        .filter_map(|s| match &s.payload {
            MetricPayload::Disk(d) => Some((s.timestamp, d.read_bytes, d.write_bytes)),
            _ => None,
        })
        .collect();
    let disk = disk_points.last().map(|(_, read, write)| {
        let reads: Vec<_> = disk_points.iter().map(|(ts, r, _)| (*ts, *r)).collect();
        let writes: Vec<_> = disk_points.iter().map(|(ts, _, w)| (*ts, *w)).collect();
        DiskSummary {
            read_rate_bytes_per_sec: rate(&reads),
            write_rate_bytes_per_sec: rate(&writes),
            total_read_bytes: *read,
            total_write_bytes: *write,
        }
    });

    let net_points: Vec<(DateTime<Utc>, u64, u64)> = samples(by_type, MetricType::Network)
        .iter()
        .filter_map(|s| match &s.payload {
            MetricPayload::Network(n) => Some((s.timestamp, n.rx_bytes, n.tx_bytes)),
            _ => None,
        })
        .collect();
    let network = net_points.last().map(|(_, rx, tx)| {
        let rxs: Vec<_> = net_points.iter().map(|(ts, r, _)| (*ts, *r)).collect();
        let txs: Vec<_> = net_points.iter().map(|(ts, _, t)| (*ts, *t)).collect();
        NetworkSummary {
            rx_rate_bytes_per_sec: rate(&rxs),
            tx_rate_bytes_per_sec: rate(&txs),
            total_rx_bytes: *rx,
            total_tx_bytes: *tx,
        }
    });

    Some(ContainerSummary {
        container_id: container_id.to_string(),
        cpu: usage_summary(&cpu_values),
        memory: usage_summary(&memory_values),
        memory_limit,
        disk,
        network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuMetrics, DiskMetrics};
    use chrono::{Duration, TimeZone};

    fn t(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(s)
    }

    fn cpu(ts: DateTime<Utc>, pct: f64) -> MetricSample {
        MetricSample::new(
            "c",
            ts,
            MetricPayload::Cpu(CpuMetrics {
                usage_percent: pct,
                ..Default::default()
            }),
        )
    }

    fn disk(ts: DateTime<Utc>, read: u64, write: u64) -> MetricSample {
        MetricSample::new(
            "c",
            ts,
            MetricPayload::Disk(DiskMetrics {
                read_bytes: read,
                write_bytes: write,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_usage_and_rates() {
        let mut by_type = BTreeMap::new();
        by_type.insert(MetricType::Cpu, vec![cpu(t(0), 10.0), cpu(t(10), 30.0), cpu(t(20), 20.0)]);
        by_type.insert(MetricType::Disk, vec![disk(t(0), 0, 100), disk(t(10), 1_000, 600)]);

        let summary = summarize("c", &by_type).unwrap();
        let cpu = summary.cpu.unwrap();
        assert_eq!(cpu.average_usage_percent, 20.0);
        assert_eq!((cpu.current, cpu.min, cpu.max), (20.0, 10.0, 30.0));
        assert!(summary.memory.is_none());

        let disk = summary.disk.unwrap();
        assert_eq!(disk.read_rate_bytes_per_sec, Some(100.0));
        assert_eq!(disk.write_rate_bytes_per_sec, Some(50.0));
        assert_eq!(disk.combined_rate(), Some(150.0));
        assert_eq!(disk.total_read_bytes, 1_000);
        assert!(summary.network.is_none());
    }

    #[test]
    fn test_rate_needs_two_points_and_elapsed_time() {
        let mut by_type = BTreeMap::new();
        by_type.insert(MetricType::Disk, vec![disk(t(0), 5, 5)]);
        let single = summarize("c", &by_type).unwrap().disk.unwrap();
        assert_eq!(single.read_rate_bytes_per_sec, None);

        by_type.insert(MetricType::Disk, vec![disk(t(0), 5, 5), disk(t(0), 9, 9)]);
        let same_instant = summarize("c", &by_type).unwrap().disk.unwrap();
        assert_eq!(same_instant.combined_rate(), None);
    }

    #[test]
    fn test_empty_input() {
        assert!(summarize("c", &BTreeMap::new()).is_none());
    }
}
