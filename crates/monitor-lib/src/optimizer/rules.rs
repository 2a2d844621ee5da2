//! Recommendation generators over a container summary
//!
//! Each generator is a pure function of the summary and thresholds, so the
//! engine can run them in a fixed order: sizing, performance, cost.

use chrono::{DateTime, Utc};

use super::{Action, Category, Impact, Recommendation, Resource};
use crate::collector::ContainerSummary;
use crate::config::OptimizationConfig;
use crate::models::short_id;

/// Headroom applied to the observed peak
const HEADROOM: f64 = 1.5;

/// Floor for a decreased limit, in percent
const MIN_RECOMMENDED_PERCENT: f64 = 10.0;

/// Smallest memory limit the engine accepts, in MiB
const MIN_MEMORY_MIB: u64 = 6;

const MIB: f64 = 1024.0 * 1024.0;

fn base(
    summary: &ContainerSummary,
    category: Category,
    resource: Resource,
    action: Action,
    impact: Impact,
    description: String,
    now: DateTime<Utc>,
) -> Recommendation {
    Recommendation {
        container_id: summary.container_id.clone(),
        category,
        resource,
        action,
        current_usage: None,
        recommended_value: None,
        threshold: None,
        impact,
        description,
        command: None,
        suggestions: Vec::new(),
        estimated_savings: None,
        timestamp: now,
    }
}

fn cpu_command(container_id: &str, recommended: f64) -> String {
    format!("docker update --cpus={:.1} {}", recommended / 100.0, short_id(container_id))
}

fn memory_command(container_id: &str, recommended: f64, limit: Option<u64>) -> String {
    let mib = match limit {
        Some(limit) => ((limit as f64 * recommended / 100.0) / MIB).floor() as u64,
        None => recommended as u64,
    };
    format!(
        "docker update --memory={}m {}",
        mib.max(MIN_MEMORY_MIB),
        short_id(container_id)
    )
}

/// Right-size CPU and memory limits from peak usage
pub fn sizing(
    summary: &ContainerSummary,
    config: &OptimizationConfig,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let id = summary.container_id.as_str();

    if let Some(cpu) = &summary.cpu {
        let peak = cpu.max;
        if peak < config.cpu_low_threshold {
            let recommended = (peak * HEADROOM).max(MIN_RECOMMENDED_PERCENT);
            let mut rec = base(
                summary,
                Category::Sizing,
                Resource::Cpu,
                Action::Decrease,
                Impact::Low,
                format!(
                    "CPU is over-provisioned. Maximum usage is {:.1}%, average is {:.1}%. Consider reducing CPU limits.",
                    peak, cpu.average_usage_percent
                ),
                now,
            );
            rec.current_usage = Some(peak);
            rec.recommended_value = Some(recommended);
            rec.threshold = Some(config.cpu_low_threshold);
            rec.command = Some(cpu_command(id, recommended));
            out.push(rec);
        } else if peak > config.cpu_high_threshold {
            let recommended = peak * HEADROOM;
            let mut rec = base(
                summary,
                Category::Sizing,
                Resource::Cpu,
                Action::Increase,
                Impact::Medium,
                format!(
                    "CPU may be under-provisioned. Maximum usage is {:.1}%, average is {:.1}%. Consider increasing CPU limits.",
                    peak, cpu.average_usage_percent
                ),
                now,
            );
            rec.current_usage = Some(peak);
            rec.recommended_value = Some(recommended);
            rec.threshold = Some(config.cpu_high_threshold);
            rec.command = Some(cpu_command(id, recommended));
            out.push(rec);
        }
    }

    if let Some(memory) = &summary.memory {
        let peak = memory.max;
        if peak < config.memory_low_threshold {
            let recommended = (peak * HEADROOM).max(MIN_RECOMMENDED_PERCENT);
            let mut rec = base(
                summary,
                Category::Sizing,
                Resource::Memory,
                Action::Decrease,
                Impact::Low,
                format!(
                    "Memory is over-provisioned. Maximum usage is {:.1}%, average is {:.1}%. Consider reducing memory limits.",
                    peak, memory.average_usage_percent
                ),
                now,
            );
            rec.current_usage = Some(peak);
            rec.recommended_value = Some(recommended);
            rec.threshold = Some(config.memory_low_threshold);
            rec.command = Some(memory_command(id, recommended, summary.memory_limit));
            out.push(rec);
        } else if peak > config.memory_high_threshold {
            let recommended = peak * HEADROOM;
            let mut rec = base(
                summary,
                Category::Sizing,
                Resource::Memory,
                Action::Increase,
                Impact::High,
                format!(
                    "Memory may be under-provisioned. Maximum usage is {:.1}%, average is {:.1}%. Consider increasing memory limits.",
                    peak, memory.average_usage_percent
                ),
                now,
            );
            rec.current_usage = Some(peak);
            rec.recommended_value = Some(recommended);
            rec.threshold = Some(config.memory_high_threshold);
            rec.command = Some(memory_command(id, recommended, summary.memory_limit));
            out.push(rec);
        }
    }

    out
}

fn suggestions(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Flag heavy disk or network I/O and CPU near saturation
pub fn performance(
    summary: &ContainerSummary,
    config: &OptimizationConfig,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if let Some(rate) = summary.disk.as_ref().and_then(|d| d.combined_rate()) {
        if rate > config.disk_io_threshold {
            let mut rec = base(
                summary,
                Category::Performance,
                Resource::Disk,
                Action::HighIo,
                Impact::Medium,
                format!(
                    "High disk I/O detected: {:.1} MB/s. Consider faster volume mounts or optimizing I/O patterns.",
                    rate / 1_000_000.0
                ),
                now,
            );
            rec.current_usage = Some(rate);
            rec.threshold = Some(config.disk_io_threshold);
            rec.suggestions = suggestions(&[
                "Use volume mounts backed by faster storage",
                "Optimize I/O patterns in the application",
                "Use a tmpfs mount for temporary files",
                "Use a volume driver suited to the workload",
            ]);
            out.push(rec);
        }
    }

    if let Some(rate) = summary.network.as_ref().and_then(|n| n.combined_rate()) {
        if rate > config.network_io_threshold {
            let mut rec = base(
                summary,
                Category::Performance,
                Resource::Network,
                Action::HighIo,
                Impact::Medium,
                format!(
                    "High network I/O detected: {:.1} MB/s. Consider optimizing network usage or changing the network mode.",
                    rate / 1_000_000.0
                ),
                now,
            );
            rec.current_usage = Some(rate);
            rec.threshold = Some(config.network_io_threshold);
            rec.suggestions = suggestions(&[
                "Review the container network mode and driver",
                "Compress payloads between services",
                "Cache responses to reduce repeated transfers",
                "Batch small requests",
            ]);
            out.push(rec);
        }
    }

    if let Some(cpu) = &summary.cpu {
        if cpu.max > config.throttling_threshold {
            let mut rec = base(
                summary,
                Category::Performance,
                Resource::Cpu,
                Action::PotentialThrottling,
                Impact::High,
                format!(
                    "CPU usage is very high ({:.1}%), which may lead to throttling. Consider increasing CPU limits or optimizing the application.",
                    cpu.max
                ),
                now,
            );
            rec.current_usage = Some(cpu.max);
            rec.threshold = Some(config.throttling_threshold);
            rec.suggestions = suggestions(&[
                "Increase CPU limits",
                "Profile the application to find CPU hot spots",
                "Scale out across multiple containers",
                "Check for contention on the host",
            ]);
            out.push(rec);
        }
    }

    out
}

/// Low-utilization and consolidation hints.
///
/// The consolidation hint is appended for every container, whatever its
/// utilization.
pub fn cost(
    summary: &ContainerSummary,
    config: &OptimizationConfig,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if let (Some(cpu), Some(memory)) = (&summary.cpu, &summary.memory) {
        let cpu_avg = cpu.average_usage_percent;
        let memory_avg = memory.average_usage_percent;
        if cpu_avg < config.low_utilization_threshold && memory_avg < config.low_utilization_threshold {
            let mut rec = base(
                summary,
                Category::Cost,
                Resource::General,
                Action::LowUtilization,
                Impact::Medium,
                format!(
                    "Container has very low resource utilization (CPU: {:.1}%, Memory: {:.1}%). Consider consolidating with other containers or reducing resource limits.",
                    cpu_avg, memory_avg
                ),
                now,
            );
            rec.current_usage = Some(cpu_avg);
            rec.threshold = Some(config.low_utilization_threshold);
            rec.suggestions = suggestions(&[
                "Consolidate with other containers",
                "Reduce resource limits",
                "Use a smaller base image",
                "Check whether this container is still needed",
            ]);
            rec.estimated_savings = Some("Medium".to_string());
            out.push(rec);
        }
    }

    let mut rec = base(
        summary,
        Category::Cost,
        Resource::General,
        Action::ConsolidationOpportunity,
        Impact::Low,
        "Consider using Docker Compose or Kubernetes to manage related containers and share resources.".to_string(),
        now,
    );
    rec.suggestions = suggestions(&[
        "Group related containers with Docker Compose",
        "Use Kubernetes for orchestration",
        "Apply resource quotas",
        "Set resource limits consistently",
    ]);
    rec.estimated_savings = Some("Low to Medium".to_string());
    out.push(rec);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{DiskSummary, NetworkSummary, UsageSummary};

    fn usage(avg: f64, max: f64) -> UsageSummary {
        UsageSummary {
            average_usage_percent: avg,
            current: avg,
            min: avg.min(max),
            max,
        }
    }

    fn summary(cpu: Option<UsageSummary>, memory: Option<UsageSummary>) -> ContainerSummary {
        ContainerSummary {
            container_id: "0123456789abcdef".to_string(),
            cpu,
            memory,
            memory_limit: None,
            disk: None,
            network: None,
        }
    }

    #[test]
    fn test_cpu_decrease() {
        let s = summary(Some(usage(8.0, 15.0)), None);
        let recs = sizing(&s, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs.len(), 1);

        let rec = &recs[0];
        assert_eq!(
            (rec.category, rec.resource, rec.action),
            (Category::Sizing, Resource::Cpu, Action::Decrease)
        );
        assert_eq!(rec.recommended_value, Some(22.5));
        assert_eq!(rec.current_usage, Some(15.0));
        assert_eq!(rec.impact, Impact::Low);
        assert_eq!(rec.command.as_deref(), Some("docker update --cpus=0.2 0123456789ab"));
    }

    #[test]
    fn test_decrease_has_floor() {
        let s = summary(Some(usage(1.0, 2.0)), None);
        let recs = sizing(&s, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs[0].recommended_value, Some(10.0));
    }

    #[test]
    fn test_increase_impacts() {
        let s = summary(Some(usage(70.0, 85.0)), Some(usage(70.0, 90.0)));
        let recs = sizing(&s, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs.len(), 2);
        assert_eq!((recs[0].action, recs[0].impact), (Action::Increase, Impact::Medium));
        assert_eq!((recs[1].resource, recs[1].impact), (Resource::Memory, Impact::High));
        assert_eq!(recs[1].recommended_value, Some(135.0));
    }

    #[test]
    fn test_in_band_usage_has_no_sizing() {
        let s = summary(Some(usage(40.0, 50.0)), Some(usage(40.0, 50.0)));
        assert!(sizing(&s, &OptimizationConfig::default(), Utc::now()).is_empty());
    }

    #[test]
    fn test_memory_command_uses_limit() {
        // 512 MiB limit, recommended 15% -> 76 MiB
        let cmd = memory_command("abc", 15.0, Some(512 * 1024 * 1024));
        assert_eq!(cmd, "docker update --memory=76m abc");
        assert_eq!(memory_command("abc", 2.0, None), "docker update --memory=6m abc");
    }

    #[test]
    fn test_performance_rules() {
        let mut s = summary(Some(usage(60.0, 95.0)), None);
        s.disk = Some(DiskSummary {
            read_rate_bytes_per_sec: Some(80_000_000.0),
            write_rate_bytes_per_sec: Some(30_000_000.0),
            total_read_bytes: 0,
            total_write_bytes: 0,
        });
        s.network = Some(NetworkSummary {
            rx_rate_bytes_per_sec: Some(1_000.0),
            tx_rate_bytes_per_sec: None,
            total_rx_bytes: 0,
            total_tx_bytes: 0,
        });

        let recs = performance(&s, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs.len(), 2);
        assert_eq!((recs[0].resource, recs[0].action), (Resource::Disk, Action::HighIo));
        assert_eq!(recs[0].suggestions.len(), 4);
        assert!(recs[0].description.contains("110.0 MB/s"));
        assert_eq!(
            (recs[1].action, recs[1].impact),
            (Action::PotentialThrottling, Impact::High)
        );
    }

    #[test]
    fn test_cost_rules() {
        let idle = summary(Some(usage(2.0, 3.0)), Some(usage(5.0, 6.0)));
        let recs = cost(&idle, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].action, Action::LowUtilization);
        assert_eq!(recs[0].estimated_savings.as_deref(), Some("Medium"));
        assert_eq!(recs[1].action, Action::ConsolidationOpportunity);

        let busy = summary(Some(usage(50.0, 60.0)), None);
        let recs = cost(&busy, &OptimizationConfig::default(), Utc::now());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].estimated_savings.as_deref(), Some("Low to Medium"));
        assert_eq!(recs[0].impact, Impact::Low);
    }
}
