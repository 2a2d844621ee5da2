//! Observability infrastructure for the resource monitor
//!
//! Provides:
//! - Prometheus metrics (collection latency, containers monitored, samples,
//!   anomalies, recommendations and per-component error counts)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for collection latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    collection_latency_seconds: Histogram,
    containers_monitored: IntGauge,
    samples_collected: IntCounter,
    collection_errors: IntCounter,
    anomalies_detected: IntCounter,
    detection_errors: IntCounter,
    recommendations_generated: IntCounter,
    optimization_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "resource_monitor_collection_latency_seconds",
                "Time spent in one metrics collection cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            containers_monitored: register_int_gauge!(
                "resource_monitor_containers_monitored",
                "Number of containers with samples in the metrics store"
            )
            .expect("Failed to register containers_monitored"),

            samples_collected: register_int_counter!(
                "resource_monitor_samples_collected_total",
                "Total number of metric samples appended to the store"
            )
            .expect("Failed to register samples_collected"),

            collection_errors: register_int_counter!(
                "resource_monitor_collection_errors_total",
                "Total number of per-container collection failures"
            )
            .expect("Failed to register collection_errors"),

            anomalies_detected: register_int_counter!(
                "resource_monitor_anomalies_detected_total",
                "Total number of anomalies emitted after cooldown"
            )
            .expect("Failed to register anomalies_detected"),

            detection_errors: register_int_counter!(
                "resource_monitor_detection_errors_total",
                "Total number of per-series detection failures"
            )
            .expect("Failed to register detection_errors"),

            recommendations_generated: register_int_counter!(
                "resource_monitor_recommendations_generated_total",
                "Total number of optimization recommendations generated"
            )
            .expect("Failed to register recommendations_generated"),

            optimization_errors: register_int_counter!(
                "resource_monitor_optimization_errors_total",
                "Total number of per-container recommendation failures"
            )
            .expect("Failed to register optimization_errors"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn set_containers_monitored(&self, count: i64) {
        self.inner().containers_monitored.set(count);
    }

    pub fn add_samples_collected(&self, count: u64) {
        self.inner().samples_collected.inc_by(count);
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn add_anomalies_detected(&self, count: u64) {
        self.inner().anomalies_detected.inc_by(count);
    }

    pub fn inc_detection_errors(&self) {
        self.inner().detection_errors.inc();
    }

    pub fn add_recommendations_generated(&self, count: u64) {
        self.inner().recommendations_generated.inc_by(count);
    }

    pub fn inc_optimization_errors(&self) {
        self.inner().optimization_errors.inc();
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted records for lifecycle events,
/// anomalies and recommendations.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log an anomaly that passed the cooldown check
    pub fn log_anomaly(
        &self,
        container_id: &str,
        metric_type: &str,
        kind: &str,
        severity: u8,
        value: f64,
        expected: f64,
        description: &str,
    ) {
        if severity >= 3 {
            warn!(
                event = "anomaly_detected",
                instance = %self.instance,
                container_id = %container_id,
                metric_type = %metric_type,
                kind = %kind,
                severity = severity,
                value = value,
                expected = expected,
                details = %description,
                "High severity anomaly detected"
            );
        } else {
            info!(
                event = "anomaly_detected",
                instance = %self.instance,
                container_id = %container_id,
                metric_type = %metric_type,
                kind = %kind,
                severity = severity,
                value = value,
                expected = expected,
                details = %description,
                "Anomaly detected"
            );
        }
    }

    /// Log a generated recommendation
    pub fn log_recommendation(
        &self,
        container_id: &str,
        category: &str,
        resource: &str,
        action: &str,
        impact: &str,
    ) {
        info!(
            event = "recommendation_generated",
            instance = %self.instance,
            container_id = %container_id,
            category = %category,
            resource = %resource,
            action = %action,
            impact = %impact,
            "Optimization recommendation generated"
        );
    }

    /// Log the outcome of one worker cycle
    pub fn log_cycle(&self, component: &str, items: usize, errors: usize, elapsed_ms: u128) {
        info!(
            event = "cycle_complete",
            instance = %self.instance,
            component = %component,
            items = items,
            errors = errors,
            elapsed_ms = elapsed_ms as u64,
            "Worker cycle complete"
        );
    }

    /// Log daemon startup
    pub fn log_startup(&self, version: &str, pid: u32) {
        info!(
            event = "daemon_started",
            instance = %self.instance,
            version = %version,
            pid = pid,
            "Resource monitor started"
        );
    }

    /// Log daemon shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "daemon_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Resource monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = MonitorMetrics::new();
        let b = MonitorMetrics::new();
        a.add_samples_collected(2);
        b.inc_collection_errors();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert!(names.contains(&"resource_monitor_samples_collected_total".to_string()));
        assert!(names.contains(&"resource_monitor_collection_errors_total".to_string()));
    }

    #[test]
    fn test_logger_does_not_panic() {
        let logger = StructuredLogger::new("test-host");
        logger.log_anomaly("abc", "cpu", "outlier", 3, 95.0, 40.0, "spike");
        logger.log_recommendation("abc", "sizing", "cpu", "decrease", "low");
        logger.log_cycle("collector", 2, 0, 12);
        logger.log_startup("0.1.0", 42);
        logger.log_shutdown("test");
    }
}
