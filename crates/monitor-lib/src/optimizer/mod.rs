//! Rule-based resource optimization
//!
//! This module provides:
//! - Sizing, performance and cost recommendation generators
//! - A periodic analysis worker over collector summaries
//! - A retention-bounded recommendation history with filtered queries
//! - Text, JSON and HTML report rendering

mod report;
mod rules;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::collector::{ContainerSummary, MetricsCollector};
use crate::config::OptimizationConfig;
use crate::error::{FilterParseError, OptimizationError};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::query::{self, TimeRange};
use crate::worker::PeriodicWorker;

pub use report::{html_report, text_report, ReportFormat, NO_RECOMMENDATIONS};
pub use rules::{cost, performance, sizing};

/// Wait before retrying after a failed analysis cycle
const ANALYSIS_BACKOFF: Duration = Duration::from_secs(60);

macro_rules! label_enum {
    ($name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = FilterParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    other => Err(FilterParseError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sizing,
    Performance,
    Cost,
}

label_enum!(Category, "category" {
    Sizing => "sizing",
    Performance => "performance",
    Cost => "cost",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
    Network,
    General,
}

label_enum!(Resource, "resource" {
    Cpu => "cpu",
    Memory => "memory",
    Disk => "disk",
    Network => "network",
    General => "general",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Decrease,
    Increase,
    HighIo,
    PotentialThrottling,
    LowUtilization,
    ConsolidationOpportunity,
}

label_enum!(Action, "action" {
    Decrease => "decrease",
    Increase => "increase",
    HighIo => "high_io",
    PotentialThrottling => "potential_throttling",
    LowUtilization => "low_utilization",
    ConsolidationOpportunity => "consolidation_opportunity",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

label_enum!(Impact, "impact" {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// One proposed change; never mutated once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub container_id: String,
    pub category: Category,
    pub resource: Resource,
    pub action: Action,
    /// Peak percent for sizing, bytes/sec for I/O, average percent for cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<f64>,
    /// Proposed limit in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub impact: Impact,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_savings: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub type RecommendationsByContainer = BTreeMap<String, Vec<Recommendation>>;

/// Filters for [`OptimizationEngine::get_recommendations`]
#[derive(Debug, Clone, Default)]
pub struct RecommendationFilter {
    pub container_id: Option<String>,
    pub category: Option<Category>,
    pub resource: Option<Resource>,
    pub range: TimeRange,
}

impl RecommendationFilter {
    pub fn container(container_id: Option<&str>) -> Self {
        Self {
            container_id: container_id.map(str::to_string),
            ..Default::default()
        }
    }

    fn matches(&self, rec: &Recommendation) -> bool {
        self.category.map_or(true, |c| c == rec.category)
            && self.resource.map_or(true, |r| r == rec.resource)
            && self.range.contains(rec.timestamp)
    }
}

pub struct OptimizationEngine {
    collector: Arc<MetricsCollector>,
    config: OptimizationConfig,
    history: RwLock<RecommendationsByContainer>,
    recommendations_generated: AtomicU64,
    worker: PeriodicWorker,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl OptimizationEngine {
    pub fn new(collector: Arc<MetricsCollector>, config: OptimizationConfig, instance_name: &str) -> Self {
        Self {
            collector,
            config,
            history: RwLock::new(BTreeMap::new()),
            recommendations_generated: AtomicU64::new(0),
            worker: PeriodicWorker::new("optimization_engine"),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new(instance_name),
        }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Start the background analysis loop; a second call is a no-op
    pub fn start_analysis(self: &Arc<Self>) -> bool {
        let engine: Weak<Self> = Arc::downgrade(self);
        self.worker.start(
            self.config.analysis_interval(),
            ANALYSIS_BACKOFF,
            move || {
                let engine = engine.upgrade();
                async move {
                    if let Some(engine) = engine {
                        engine.generate_recommendations().await;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            },
        )
    }

    pub async fn stop_analysis(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Run every generator for each container with a summary.
    ///
    /// Returns the recommendations produced in this cycle. A container whose
    /// summary cannot be analysed is logged and skipped.
    pub async fn generate_recommendations(&self) -> RecommendationsByContainer {
        let started = Instant::now();
        let now = Utc::now();
        let window = self.config.lookback_period();

        let mut produced = RecommendationsByContainer::new();
        let mut errors = 0;

        for container_id in self.collector.container_ids().await {
            let Some(summary) = self
                .collector
                .get_container_metrics_summary(&container_id, Some(window))
                .await
            else {
                debug!(container_id = %container_id, "No metrics summary available");
                continue;
            };

            match self.analyze(&summary, now) {
                Ok(recs) if !recs.is_empty() => {
                    produced.insert(container_id, recs);
                }
                Ok(_) => {}
                Err(e) => {
                    errors += 1;
                    self.metrics.inc_optimization_errors();
                    warn!(container_id = %container_id, error = %e, "Recommendation generation failed");
                }
            }
        }

        let count: usize = produced.values().map(Vec::len).sum();
        if count > 0 {
            let mut history = self.history.write().await;
            for (container_id, recs) in &produced {
                for rec in recs {
                    self.logger.log_recommendation(
                        container_id,
                        rec.category.as_str(),
                        rec.resource.as_str(),
                        rec.action.as_str(),
                        rec.impact.as_str(),
                    );
                }
                history
                    .entry(container_id.clone())
                    .or_default()
                    .extend(recs.iter().cloned());
            }
            self.recommendations_generated
                .fetch_add(count as u64, Ordering::Relaxed);
            self.metrics.add_recommendations_generated(count as u64);
        }

        self.prune_history(now).await;
        self.logger.log_cycle(
            "optimization_engine",
            count,
            errors,
            started.elapsed().as_millis(),
        );

        produced
    }

    /// Sizing, then performance, then cost, for one summary
    pub fn analyze(
        &self,
        summary: &ContainerSummary,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, OptimizationError> {
        validate(summary)?;

        let mut recs = sizing(summary, &self.config, now);
        recs.extend(performance(summary, &self.config, now));
        recs.extend(cost(summary, &self.config, now));
        Ok(recs)
    }

    /// Drop recommendations older than the retention period
    pub async fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let cutoff = query::cutoff(now, self.config.history_retention());
        let mut removed = 0;

        let mut history = self.history.write().await;
        for recs in history.values_mut() {
            let before = recs.len();
            recs.retain(|r| r.timestamp >= cutoff);
            removed += before - recs.len();
        }
        history.retain(|_, recs| !recs.is_empty());
        removed
    }

    /// Stored recommendations matching the filter; empty lists are omitted
    pub async fn get_recommendations(&self, filter: &RecommendationFilter) -> RecommendationsByContainer {
        let history = self.history.read().await;

        history
            .iter()
            .filter(|(id, _)| filter.container_id.as_deref().map_or(true, |wanted| wanted == id.as_str()))
            .filter_map(|(id, recs)| {
                let matching: Vec<Recommendation> =
                    recs.iter().filter(|r| filter.matches(r)).cloned().collect();
                (!matching.is_empty()).then(|| (id.clone(), matching))
            })
            .collect()
    }

    /// Render stored recommendations for one or all containers
    pub async fn generate_optimization_report(
        &self,
        container_id: Option<&str>,
        format: ReportFormat,
    ) -> Result<String, OptimizationError> {
        let recs = self
            .get_recommendations(&RecommendationFilter::container(container_id))
            .await;
        if recs.is_empty() {
            return Ok(NO_RECOMMENDATIONS.to_string());
        }

        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&recs)?),
            ReportFormat::Html => Ok(html_report(&recs, Utc::now())),
            ReportFormat::Text => Ok(text_report(&recs)),
        }
    }

    /// Recommendations produced since construction
    pub fn recommendations_generated(&self) -> u64 {
        self.recommendations_generated.load(Ordering::Relaxed)
    }
}

fn validate(summary: &ContainerSummary) -> Result<(), OptimizationError> {
    let usages = [&summary.cpu, &summary.memory];
    for usage in usages.into_iter().flatten() {
        let values = [usage.average_usage_percent, usage.current, usage.min, usage.max];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(OptimizationError::InvalidSummary {
                container_id: summary.container_id.clone(),
                reason: "non-finite usage value".to_string(),
            });
        }
    }
    Ok(())
}
