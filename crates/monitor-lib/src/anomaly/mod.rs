//! Anomaly detection over collected metrics
//!
//! This module provides:
//! - Per-series statistical baselines, rebuilt every cycle
//! - Outlier, trend and hour-of-day seasonality detectors
//! - Cooldown-based deduplication per (container, metric type)
//! - Grouped notifications and a retention-bounded anomaly history

mod alerts;
mod baseline;
mod cooldown;
mod outlier;
mod seasonality;
mod trend;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::collector::MetricsCollector;
use crate::config::AnomalyConfig;
use crate::error::DetectionError;
use crate::models::{MetricSample, MetricType, Severity};
use crate::notifier::Notifier;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::query::{self, TimeRange};
use crate::worker::PeriodicWorker;

pub use alerts::{build_notifications, ANOMALY_CATEGORY};
pub use baseline::{percentile, population_std_dev, severity_for, Baseline};
pub use cooldown::AlertCooldown;
pub use outlier::OutlierDetector;
pub use seasonality::SeasonalityDetector;
pub use trend::TrendDetector;

/// Wait before retrying after a failed detection cycle
const DETECTION_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

/// Detector that produced an anomaly, with its specific evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnomalyKind {
    Outlier {
        /// Bound that was crossed
        threshold: f64,
    },
    Trend {
        trend: f64,
        normalized_trend: f64,
        direction: TrendDirection,
    },
    Seasonality {
        hour: u32,
    },
}

impl AnomalyKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyKind::Outlier { .. } => "outlier",
            AnomalyKind::Trend { .. } => "trend",
            AnomalyKind::Seasonality { .. } => "seasonality",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An emitted anomaly; never mutated once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub container_id: String,
    pub metric_type: MetricType,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Baseline mean, or the hour-bucket mean for seasonality
    pub expected: f64,
    /// z-score for outlier/seasonality, normalized slope for trend
    pub deviation: f64,
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
}

pub type AnomaliesByContainer = BTreeMap<String, Vec<Anomaly>>;
pub type BaselinesByContainer = BTreeMap<String, BTreeMap<MetricType, Baseline>>;

/// Filters for [`AnomalyDetector::get_anomalies`]
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub container_id: Option<String>,
    pub metric_type: Option<MetricType>,
    pub range: TimeRange,
    pub severity: Option<Severity>,
}

pub struct AnomalyDetector {
    collector: Arc<MetricsCollector>,
    notifier: Arc<dyn Notifier>,
    config: AnomalyConfig,
    outliers: OutlierDetector,
    trends: TrendDetector,
    seasonality: SeasonalityDetector,
    cooldown: AlertCooldown,
    baselines: RwLock<BaselinesByContainer>,
    history: RwLock<AnomaliesByContainer>,
    anomalies_detected: AtomicU64,
    worker: PeriodicWorker,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl AnomalyDetector {
    pub fn new(
        collector: Arc<MetricsCollector>,
        notifier: Arc<dyn Notifier>,
        config: AnomalyConfig,
        instance_name: &str,
    ) -> Self {
        Self {
            collector,
            notifier,
            outliers: OutlierDetector::new(),
            trends: TrendDetector::new(),
            seasonality: SeasonalityDetector::new(config.threshold_multiplier),
            cooldown: AlertCooldown::new(config.alert_cooldown()),
            config,
            baselines: RwLock::new(BTreeMap::new()),
            history: RwLock::new(BTreeMap::new()),
            anomalies_detected: AtomicU64::new(0),
            worker: PeriodicWorker::new("anomaly_detector"),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new(instance_name),
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Start the background detection loop; a second call is a no-op
    pub fn start_detection(self: &Arc<Self>) -> bool {
        let detector: Weak<Self> = Arc::downgrade(self);
        self.worker.start(
            self.config.detection_interval(),
            DETECTION_BACKOFF,
            move || {
                let detector = detector.upgrade();
                async move {
                    if let Some(detector) = detector {
                        detector.detect_anomalies().await;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
    }

    pub async fn stop_detection(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Run one detection pass over every enabled metric type.
    ///
    /// Returns the anomalies emitted in this cycle, keyed by container.
    /// A failing (container, metric type) pair is logged and skipped.
    pub async fn detect_anomalies(&self) -> AnomaliesByContainer {
        let started = Instant::now();
        let now = Utc::now();
        let range = TimeRange::trailing(now, self.config.lookback_period());

        let mut found = AnomaliesByContainer::new();
        let mut errors = 0;

        for metric_type in self.config.enabled.iter() {
            let data = self.collector.get_metrics(None, Some(metric_type), range).await;

            for (container_id, mut by_type) in data {
                let Some(samples) = by_type.remove(&metric_type) else {
                    continue;
                };
                if samples.len() < self.config.min_data_points {
                    debug!(
                        container_id = %container_id,
                        metric_type = %metric_type,
                        samples = samples.len(),
                        "Not enough samples for baseline"
                    );
                    continue;
                }

                match self.detect_series(&container_id, metric_type, &samples, now).await {
                    Ok(anomalies) if !anomalies.is_empty() => {
                        found.entry(container_id).or_default().extend(anomalies);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        errors += 1;
                        self.metrics.inc_detection_errors();
                        warn!(
                            container_id = %container_id,
                            metric_type = %metric_type,
                            error = %e,
                            "Anomaly detection failed"
                        );
                    }
                }
            }
        }

        let emitted: usize = found.values().map(Vec::len).sum();
        self.record(&found).await;
        for (container_id, anomalies) in &found {
            self.send_alerts(container_id, anomalies).await;
        }
        self.prune_history(now).await;

        self.logger.log_cycle(
            "anomaly_detector",
            emitted,
            errors,
            started.elapsed().as_millis(),
        );

        found
    }

    /// Rebuild one series' baseline and run the detectors against it
    async fn detect_series(
        &self,
        container_id: &str,
        metric_type: MetricType,
        samples: &[MetricSample],
        now: DateTime<Utc>,
    ) -> Result<Vec<Anomaly>, DetectionError> {
        let points: Vec<(DateTime<Utc>, f64)> = samples
            .iter()
            .filter_map(|s| s.payload.scalar().map(|v| (s.timestamp, v)))
            .collect();

        if points.len() < self.config.min_data_points {
            return Err(DetectionError::InsufficientData {
                container_id: container_id.to_string(),
                metric_type,
                count: points.len(),
            });
        }

        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let baseline = Baseline::compute(
            container_id,
            metric_type,
            &values,
            self.config.threshold_multiplier,
            now,
        )?;

        let mut candidates = self.outliers.detect(&baseline, &points);
        candidates.extend(self.trends.detect(&baseline, &points));
        candidates.extend(self.seasonality.detect(&baseline, &points));

        self.baselines
            .write()
            .await
            .entry(container_id.to_string())
            .or_default()
            .insert(metric_type, baseline);

        Ok(candidates
            .into_iter()
            .filter(|a| self.cooldown.admit(&a.container_id, a.metric_type, a.timestamp))
            .collect())
    }

    async fn record(&self, found: &AnomaliesByContainer) {
        if found.is_empty() {
            return;
        }

        let mut history = self.history.write().await;
        for (container_id, anomalies) in found {
            for a in anomalies {
                self.logger.log_anomaly(
                    container_id,
                    a.metric_type.as_str(),
                    a.kind.name(),
                    a.severity.level(),
                    a.value,
                    a.expected,
                    &a.description,
                );
            }
            history
                .entry(container_id.clone())
                .or_default()
                .extend(anomalies.iter().cloned());
        }

        let emitted: usize = found.values().map(Vec::len).sum();
        self.anomalies_detected
            .fetch_add(emitted as u64, Ordering::Relaxed);
        self.metrics.add_anomalies_detected(emitted as u64);
    }

    async fn send_alerts(&self, container_id: &str, anomalies: &[Anomaly]) {
        for notification in build_notifications(container_id, anomalies) {
            let severity = notification.severity;
            if let Err(e) = self.notifier.send(notification).await {
                warn!(
                    container_id = %container_id,
                    severity = severity.level(),
                    error = %e,
                    "Failed to send anomaly notification"
                );
            }
        }
    }

    /// Drop history and cooldown entries older than the retention period
    pub async fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let cutoff = query::cutoff(now, self.config.history_retention());
        let mut removed = 0;

        let mut history = self.history.write().await;
        for anomalies in history.values_mut() {
            let before = anomalies.len();
            anomalies.retain(|a| a.timestamp >= cutoff);
            removed += before - anomalies.len();
        }
        history.retain(|_, anomalies| !anomalies.is_empty());

        self.cooldown.prune(cutoff);
        removed
    }

    /// Recorded anomalies matching the filter; containers with no match are omitted
    pub async fn get_anomalies(&self, filter: &AnomalyFilter) -> AnomaliesByContainer {
        let history = self.history.read().await;

        history
            .iter()
            .filter(|(id, _)| filter.container_id.as_deref().map_or(true, |wanted| wanted == id.as_str()))
            .filter_map(|(id, anomalies)| {
                let matching: Vec<Anomaly> = anomalies
                    .iter()
                    .filter(|a| filter.metric_type.map_or(true, |t| t == a.metric_type))
                    .filter(|a| filter.severity.map_or(true, |s| s == a.severity))
                    .filter(|a| filter.range.contains(a.timestamp))
                    .cloned()
                    .collect();
                (!matching.is_empty()).then(|| (id.clone(), matching))
            })
            .collect()
    }

    /// Current baselines, optionally narrowed to one container and/or type
    pub async fn get_baselines(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
    ) -> BaselinesByContainer {
        let baselines = self.baselines.read().await;

        baselines
            .iter()
            .filter(|(id, _)| container_id.map_or(true, |wanted| wanted == id.as_str()))
            .filter_map(|(id, by_type)| {
                let matching: BTreeMap<MetricType, Baseline> = by_type
                    .iter()
                    .filter(|(t, _)| metric_type.map_or(true, |wanted| wanted == **t))
                    .map(|(t, b)| (*t, b.clone()))
                    .collect();
                (!matching.is_empty()).then(|| (id.clone(), matching))
            })
            .collect()
    }

    /// Anomalies emitted since construction
    pub fn anomalies_detected(&self) -> u64 {
        self.anomalies_detected.load(Ordering::Relaxed)
    }
}
