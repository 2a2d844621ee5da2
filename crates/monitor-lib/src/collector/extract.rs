//! Normalization of raw stats snapshots into typed payloads

use std::collections::BTreeMap;

use crate::models::{CpuMetrics, DiskMetrics, InterfaceCounters, MemoryMetrics, NetworkMetrics};
use crate::runtime::{RawBlkioEntry, RawCpuStats, RawStats};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn total_usage(cpu: &RawCpuStats) -> u64 {
    cpu.cpu_usage
        .as_ref()
        .and_then(|u| u.total_usage)
        .unwrap_or(0)
}

/// CPU usage against `previous`, or the snapshot's own precpu section when
/// there is no earlier snapshot for this container.
pub fn cpu_metrics(stats: &RawStats, previous: Option<&RawCpuStats>) -> Option<CpuMetrics> {
    let cpu = stats.cpu_stats.as_ref()?;
    let previous = previous.or(stats.precpu_stats.as_ref());

    let total = total_usage(cpu);
    let system = cpu.system_cpu_usage.unwrap_or(0);

    let online_cpus = cpu
        .online_cpus
        .filter(|n| *n > 0)
        .or_else(|| {
            cpu.cpu_usage
                .as_ref()
                .and_then(|u| u.percpu_usage.as_ref())
                .map(|per| per.len() as u32)
                .filter(|n| *n > 0)
        })
        .unwrap_or(1);

    let usage_percent = match previous {
        Some(prev) => {
            let cpu_delta = total.saturating_sub(total_usage(prev));
            let system_delta = system.saturating_sub(prev.system_cpu_usage.unwrap_or(0));
            if cpu_delta > 0 && system_delta > 0 {
                round2(cpu_delta as f64 / system_delta as f64 * online_cpus as f64 * 100.0)
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    let throttling = cpu.throttling_data.clone().unwrap_or_default();

    Some(CpuMetrics {
        usage_percent,
        total_usage: total,
        system_usage: system,
        online_cpus,
        throttling_periods: throttling.periods.unwrap_or(0),
        throttled_periods: throttling.throttled_periods.unwrap_or(0),
        throttled_time: throttling.throttled_time.unwrap_or(0),
    })
}

/// Memory usage; cache comes from `cache` (cgroup v1) or `inactive_file` (v2)
pub fn memory_metrics(stats: &RawStats) -> Option<MemoryMetrics> {
    let memory = stats.memory_stats.as_ref()?;
    let usage = memory.usage?;
    let limit = memory.limit.unwrap_or(0);

    let detail = memory.stats.clone().unwrap_or_default();
    let cache = detail
        .get("cache")
        .or_else(|| detail.get("inactive_file"))
        .copied()
        .unwrap_or(0);
    let usage_actual = if usage > cache { usage - cache } else { usage };

    Some(MemoryMetrics {
        usage,
        limit,
        usage_percent: percent(usage, limit),
        cache,
        usage_actual,
        usage_percent_actual: percent(usage_actual, limit),
        rss: detail.get("rss").copied(),
        swap: detail.get("swap").copied(),
        active_anon: detail.get("active_anon").copied(),
        inactive_anon: detail.get("inactive_anon").copied(),
        active_file: detail.get("active_file").copied(),
        inactive_file: detail.get("inactive_file").copied(),
    })
}

fn sum_ops(entries: Option<&Vec<RawBlkioEntry>>) -> (u64, u64) {
    entries
        .map(|entries| {
            entries.iter().fold((0u64, 0u64), |(read, write), entry| {
                let value = entry.value.unwrap_or(0);
                match entry.op.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("read") => (read.saturating_add(value), write),
                    Some("write") => (read, write.saturating_add(value)),
                    _ => (read, write),
                }
            })
        })
        .unwrap_or((0, 0))
}

/// Block I/O summed across all recursive entries
pub fn disk_metrics(stats: &RawStats) -> Option<DiskMetrics> {
    let blkio = stats.blkio_stats.as_ref()?;
    let (read_bytes, write_bytes) = sum_ops(blkio.io_service_bytes_recursive.as_ref());
    let (read_ops, write_ops) = sum_ops(blkio.io_serviced_recursive.as_ref());

    Some(DiskMetrics {
        read_bytes,
        write_bytes,
        read_ops,
        write_ops,
    })
}

/// Network totals plus per-interface counters
pub fn network_metrics(stats: &RawStats) -> Option<NetworkMetrics> {
    let networks = stats.networks.as_ref()?;
    let mut metrics = NetworkMetrics::default();
    let mut interfaces = BTreeMap::new();

    for (name, raw) in networks {
        let counters = InterfaceCounters {
            rx_bytes: raw.rx_bytes.unwrap_or(0),
            tx_bytes: raw.tx_bytes.unwrap_or(0),
            rx_packets: raw.rx_packets.unwrap_or(0),
            tx_packets: raw.tx_packets.unwrap_or(0),
            rx_errors: raw.rx_errors.unwrap_or(0),
            tx_errors: raw.tx_errors.unwrap_or(0),
            rx_dropped: raw.rx_dropped.unwrap_or(0),
            tx_dropped: raw.tx_dropped.unwrap_or(0),
        };

        metrics.rx_bytes = metrics.rx_bytes.saturating_add(counters.rx_bytes);
        metrics.tx_bytes = metrics.tx_bytes.saturating_add(counters.tx_bytes);
        metrics.rx_packets = metrics.rx_packets.saturating_add(counters.rx_packets);
        metrics.tx_packets = metrics.tx_packets.saturating_add(counters.tx_packets);
        metrics.rx_errors = metrics.rx_errors.saturating_add(counters.rx_errors);
        metrics.tx_errors = metrics.tx_errors.saturating_add(counters.tx_errors);
        metrics.rx_dropped = metrics.rx_dropped.saturating_add(counters.rx_dropped);
        metrics.tx_dropped = metrics.tx_dropped.saturating_add(counters.tx_dropped);
        interfaces.insert(name.clone(), counters);
    }

    metrics.interfaces = interfaces;
    Some(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        RawBlkioStats, RawCpuUsage, RawMemoryStats, RawNetworkStats, RawThrottlingData,
    };
    use std::collections::HashMap;

    fn cpu(total: u64, system: u64) -> RawCpuStats {
        RawCpuStats {
            cpu_usage: Some(RawCpuUsage {
                total_usage: Some(total),
                percpu_usage: Some(vec![0, 0]),
            }),
            system_cpu_usage: Some(system),
            online_cpus: None,
            throttling_data: Some(RawThrottlingData {
                periods: Some(10),
                throttled_periods: Some(2),
                throttled_time: Some(500),
            }),
        }
    }

    #[test]
    fn test_cpu_percent_uses_precpu_when_no_history() {
        let stats = RawStats {
            cpu_stats: Some(cpu(2_000, 20_000)),
            precpu_stats: Some(cpu(1_000, 10_000)),
            ..Default::default()
        };
        let metrics = cpu_metrics(&stats, None).unwrap();
        // 1000 / 10000 * 2 cpus * 100
        assert_eq!(metrics.usage_percent, 20.0);
        assert_eq!(metrics.online_cpus, 2);
        assert_eq!(metrics.throttled_periods, 2);
    }

    #[test]
    fn test_cpu_percent_prefers_previous_snapshot() {
        let stats = RawStats {
            cpu_stats: Some(cpu(5_000, 40_000)),
            precpu_stats: Some(cpu(4_999, 39_999)),
            ..Default::default()
        };
        let previous = cpu(1_000, 20_000);
        let metrics = cpu_metrics(&stats, Some(&previous)).unwrap();
        assert_eq!(metrics.usage_percent, 40.0);
    }

    #[test]
    fn test_cpu_percent_clamped_on_counter_reset() {
        let stats = RawStats {
            cpu_stats: Some(cpu(100, 50_000)),
            ..Default::default()
        };
        let previous = cpu(9_000, 40_000);
        assert_eq!(cpu_metrics(&stats, Some(&previous)).unwrap().usage_percent, 0.0);
    }

    #[test]
    fn test_memory_excludes_cache() {
        let stats = RawStats {
            memory_stats: Some(RawMemoryStats {
                usage: Some(600),
                limit: Some(1_000),
                stats: Some(HashMap::from([("cache".to_string(), 100), ("rss".to_string(), 450)])),
            }),
            ..Default::default()
        };
        let m = memory_metrics(&stats).unwrap();
        assert_eq!(m.usage_percent, 60.0);
        assert_eq!(m.usage_actual, 500);
        assert_eq!(m.usage_percent_actual, 50.0);
        assert_eq!(m.rss, Some(450));
        assert_eq!(m.swap, None);
    }

    #[test]
    fn test_memory_without_limit() {
        let stats = RawStats {
            memory_stats: Some(RawMemoryStats {
                usage: Some(600),
                limit: None,
                stats: None,
            }),
            ..Default::default()
        };
        let m = memory_metrics(&stats).unwrap();
        assert_eq!(m.usage_percent, 0.0);
        assert_eq!(m.usage_actual, 600);
    }

    #[test]
    fn test_disk_sums_entries_case_insensitively() {
        let entry = |op: &str, value| RawBlkioEntry {
            op: Some(op.to_string()),
            value: Some(value),
        };
        let stats = RawStats {
            blkio_stats: Some(RawBlkioStats {
                io_service_bytes_recursive: Some(vec![
                    entry("Read", 100),
                    entry("read", 50),
                    entry("Write", 30),
                    entry("Total", 180),
                ]),
                io_serviced_recursive: Some(vec![entry("Read", 3), entry("Write", 1)]),
            }),
            ..Default::default()
        };
        let d = disk_metrics(&stats).unwrap();
        assert_eq!((d.read_bytes, d.write_bytes, d.read_ops, d.write_ops), (150, 30, 3, 1));
    }

    #[test]
    fn test_network_totals_and_interfaces() {
        let iface = |rx, tx| RawNetworkStats {
            rx_bytes: Some(rx),
            tx_bytes: Some(tx),
            rx_dropped: Some(1),
            ..Default::default()
        };
        let stats = RawStats {
            networks: Some(HashMap::from([
                ("eth0".to_string(), iface(100, 10)),
                ("eth1".to_string(), iface(50, 5)),
            ])),
            ..Default::default()
        };
        let n = network_metrics(&stats).unwrap();
        assert_eq!(n.rx_bytes, 150);
        assert_eq!(n.tx_bytes, 15);
        assert_eq!(n.rx_dropped, 2);
        assert_eq!(n.interfaces.len(), 2);
        assert_eq!(n.interfaces["eth1"].rx_bytes, 50);
    }

    #[test]
    fn test_missing_sections_yield_none() {
        let stats = RawStats::default();
        assert!(cpu_metrics(&stats, None).is_none());
        assert!(memory_metrics(&stats).is_none());
        assert!(disk_metrics(&stats).is_none());
        assert!(network_metrics(&stats).is_none());
    }
}
