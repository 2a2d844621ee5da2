//! Metrics collection from the container runtime
//!
//! This module provides:
//! - A periodic collection worker polling every running container
//! - Normalization of raw stats into typed per-category samples
//! - A retention-bounded in-memory store behind a single lock
//! - Filtered queries, exports and per-container summaries

mod custom;
mod extract;
mod store;
mod summary;


use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::error::CollectorError;
use crate::models::{ContainerState, MetricPayload, MetricSample, MetricType, MetricsByContainer};
use crate::observability::MonitorMetrics;
use crate::query::{self, TimeRange};
use crate::runtime::{ContainerRuntime, RawCpuStats};
use crate::worker::PeriodicWorker;

pub use custom::collect_custom_metrics;
pub use extract::{cpu_metrics, disk_metrics, memory_metrics, network_metrics};
pub use store::MetricStore;
pub use summary::{
    summarize, ContainerCounts, ContainerSummary, DiskSummary, NetworkSummary, SystemMetrics,
    UsageSummary,
};

/// Wait before retrying after a failed collection cycle
const COLLECTION_BACKOFF: Duration = Duration::from_secs(5);

/// Export encodings for stored samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(CollectorError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Polls the runtime and owns the metrics store
pub struct MetricsCollector {
    runtime: Arc<dyn ContainerRuntime>,
    config: MetricsConfig,
    store: RwLock<MetricStore>,
    /// Last raw CPU section per container, for usage deltas
    previous_cpu: DashMap<String, RawCpuStats>,
    metrics_collected: AtomicU64,
    worker: PeriodicWorker,
    metrics: MonitorMetrics,
}

impl MetricsCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: MetricsConfig) -> Self {
        Self {
            runtime,
            config,
            store: RwLock::new(MetricStore::new()),
            previous_cpu: DashMap::new(),
            metrics_collected: AtomicU64::new(0),
            worker: PeriodicWorker::new("metrics_collector"),
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Start the background collection loop; a second call is a no-op
    pub fn start(self: &Arc<Self>) -> bool {
        let collector: Weak<Self> = Arc::downgrade(self);
        self.worker.start(
            self.config.collection_interval(),
            COLLECTION_BACKOFF,
            move || {
                let collector = collector.upgrade();
                async move {
                    if let Some(collector) = collector {
                        collector.collect_metrics().await?;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
    }

    pub async fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// One collection pass over all running containers.
    ///
    /// Fails only when the container list itself cannot be fetched; a
    /// failing container is logged and skipped. Returns the number of
    /// samples appended.
    pub async fn collect_metrics(&self) -> Result<usize, CollectorError> {
        let started = Instant::now();
        let containers = self.runtime.list_containers(false).await?;

        let mut appended = 0;
        let mut errors = 0;

        for container in &containers {
            match self.collect_container(&container.id).await {
                Ok(payloads) => {
                    let now = Utc::now();
                    let samples: Vec<MetricSample> = payloads
                        .into_iter()
                        .map(|payload| MetricSample::new(container.id.as_str(), now, payload))
                        .collect();
                    appended += samples.len();
                    self.insert_samples(samples).await;
                }
                Err(e) => {
                    errors += 1;
                    self.metrics.inc_collection_errors();
                    warn!(
                        container_id = %container.id,
                        error = %e,
                        "Failed to collect container metrics"
                    );
                }
            }
        }

        self.previous_cpu
            .retain(|id, _| containers.iter().any(|c| &c.id == id));

        let removed = self.cleanup(Utc::now()).await;
        let elapsed = started.elapsed();
        self.metrics.observe_collection_latency(elapsed.as_secs_f64());

        debug!(
            containers = containers.len(),
            samples = appended,
            errors = errors,
            expired = removed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Collection cycle complete"
        );

        Ok(appended)
    }

    async fn collect_container(&self, container_id: &str) -> Result<Vec<MetricPayload>, CollectorError> {
        let stats = self.runtime.stats(container_id).await?;
        let enabled = self.config.enabled;
        let mut payloads = Vec::new();

        if enabled.cpu {
            let previous = self.previous_cpu.get(container_id).map(|p| p.value().clone());
            if let Some(cpu) = cpu_metrics(&stats, previous.as_ref()) {
                payloads.push(MetricPayload::Cpu(cpu));
            }
            if let Some(current) = stats.cpu_stats.clone() {
                self.previous_cpu.insert(container_id.to_string(), current);
            }
        }
        if enabled.memory {
            if let Some(memory) = memory_metrics(&stats) {
                payloads.push(MetricPayload::Memory(memory));
            }
        }
        if enabled.disk {
            if let Some(disk) = disk_metrics(&stats) {
                payloads.push(MetricPayload::Disk(disk));
            }
        }
        if enabled.network {
            if let Some(network) = network_metrics(&stats) {
                payloads.push(MetricPayload::Network(network));
            }
        }
        if enabled.custom && !self.config.custom_metrics.is_empty() {
            let values =
                collect_custom_metrics(self.runtime.as_ref(), container_id, &self.config.custom_metrics).await;
            if !values.is_empty() {
                payloads.push(MetricPayload::Custom(values));
            }
        }

        Ok(payloads)
    }

    /// Append samples under the store lock
    pub async fn insert_samples(&self, samples: impl IntoIterator<Item = MetricSample>) {
        let mut store = self.store.write().await;
        let mut count = 0u64;
        for sample in samples {
            store.append(sample);
            count += 1;
        }
        self.metrics_collected.fetch_add(count, Ordering::Relaxed);
        self.metrics.add_samples_collected(count);
        self.metrics
            .set_containers_monitored(store.container_count() as i64);
    }

    /// Purge samples older than the retention period relative to `now`
    pub async fn cleanup(&self, now: chrono::DateTime<Utc>) -> usize {
        let cutoff = query::cutoff(now, self.config.retention_period());
        let mut store = self.store.write().await;
        let removed = store.cleanup(cutoff);
        self.metrics
            .set_containers_monitored(store.container_count() as i64);
        removed
    }

    /// Filtered samples; unset filters are wildcards and bounds are inclusive
    pub async fn get_metrics(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
        range: TimeRange,
    ) -> MetricsByContainer {
        self.store.read().await.query(container_id, metric_type, range)
    }

    /// Samples of one series over the trailing `duration`
    pub async fn get_metrics_history(
        &self,
        container_id: &str,
        metric_type: MetricType,
        duration: chrono::Duration,
    ) -> Vec<MetricSample> {
        let range = TimeRange::trailing(Utc::now(), duration);
        self.get_metrics(Some(container_id), Some(metric_type), range)
            .await
            .remove(container_id)
            .and_then(|mut by_type| by_type.remove(&metric_type))
            .unwrap_or_default()
    }

    /// Serialize filtered samples as pretty JSON or flat CSV
    pub async fn export_metrics(
        &self,
        format: ExportFormat,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
        range: TimeRange,
    ) -> Result<String, CollectorError> {
        let data = self.get_metrics(container_id, metric_type, range).await;

        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&data)?),
            ExportFormat::Csv => {
                let mut out = String::from("timestamp,container_id,metric_type,metric_name,value\n");
                for (id, by_type) in &data {
                    for (t, samples) in by_type {
                        for sample in samples {
                            for (name, value) in sample.payload.fields() {
                                out.push_str(&format!(
                                    "{},{},{},{},{}\n",
                                    sample.timestamp.to_rfc3339(),
                                    csv_field(id),
                                    t,
                                    csv_field(&name),
                                    csv_field(&value)
                                ));
                            }
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Ids of containers with at least one stored sample
    pub async fn container_ids(&self) -> Vec<String> {
        self.store.read().await.container_ids()
    }

    /// Summary over the trailing `window`, or all stored samples when unset
    pub async fn get_container_metrics_summary(
        &self,
        container_id: &str,
        window: Option<chrono::Duration>,
    ) -> Option<ContainerSummary> {
        let range = window
            .map(|w| TimeRange::trailing(Utc::now(), w))
            .unwrap_or_default();
        let data = self.get_metrics(Some(container_id), None, range).await;
        data.get(container_id)
            .and_then(|by_type| summarize(container_id, by_type))
    }

    /// Host-wide container counts and aggregate usage
    pub async fn get_system_metrics(&self) -> Result<SystemMetrics, CollectorError> {
        let containers = self.runtime.list_containers(true).await?;

        let mut counts = ContainerCounts {
            total: containers.len(),
            ..Default::default()
        };
        for c in &containers {
            match c.state {
                ContainerState::Running => counts.running += 1,
                ContainerState::Paused => counts.paused += 1,
                ContainerState::Stopped => counts.stopped += 1,
            }
        }

        let mut cpu = Vec::new();
        let mut memory = Vec::new();
        let mut system = SystemMetrics {
            timestamp: Utc::now(),
            containers: counts,
            cpu_average_usage_percent: None,
            memory_average_usage_percent: None,
            disk_read_rate_bytes_per_sec: 0.0,
            disk_write_rate_bytes_per_sec: 0.0,
            network_rx_rate_bytes_per_sec: 0.0,
            network_tx_rate_bytes_per_sec: 0.0,
        };

        for c in containers.iter().filter(|c| c.state == ContainerState::Running) {
            let Some(summary) = self.get_container_metrics_summary(&c.id, None).await else {
                continue;
            };
            if let Some(s) = &summary.cpu {
                cpu.push(s.average_usage_percent);
            }
            if let Some(s) = &summary.memory {
                memory.push(s.average_usage_percent);
            }
            if let Some(d) = &summary.disk {
                system.disk_read_rate_bytes_per_sec += d.read_rate_bytes_per_sec.unwrap_or(0.0);
                system.disk_write_rate_bytes_per_sec += d.write_rate_bytes_per_sec.unwrap_or(0.0);
            }
            if let Some(n) = &summary.network {
                system.network_rx_rate_bytes_per_sec += n.rx_rate_bytes_per_sec.unwrap_or(0.0);
                system.network_tx_rate_bytes_per_sec += n.tx_rate_bytes_per_sec.unwrap_or(0.0);
            }
        }

        let mean = |v: &[f64]| (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64);
        system.cpu_average_usage_percent = mean(&cpu);
        system.memory_average_usage_percent = mean(&memory);

        Ok(system)
    }

    /// Distinct containers currently in the store
    pub async fn containers_monitored(&self) -> usize {
        self.store.read().await.container_count()
    }

    /// Samples appended since construction
    pub fn metrics_collected(&self) -> u64 {
        self.metrics_collected.load(Ordering::Relaxed)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
