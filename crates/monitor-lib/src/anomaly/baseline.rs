//! Statistical baseline of one metric series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::models::{MetricType, Severity};

/// Summary statistics of a lookback window, replaced wholesale every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub container_id: String,
    pub metric_type: MetricType,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub iqr: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    /// Compute a baseline with bounds at mean +/- `threshold_multiplier` sigma
    pub fn compute(
        container_id: &str,
        metric_type: MetricType,
        values: &[f64],
        threshold_multiplier: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, DetectionError> {
        if values.is_empty() {
            return Err(DetectionError::InsufficientData {
                container_id: container_id.to_string(),
                metric_type,
                count: 0,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DetectionError::NonFinite {
                container_id: container_id.to_string(),
                metric_type,
            });
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        // A flat series gets an exact mean so no sample can fall outside it
        let (mean, std_dev) = if min == max {
            (min, 0.0)
        } else {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            (mean, population_std_dev(values, mean))
        };

        let p25 = percentile(&sorted, 25.0);
        let p75 = percentile(&sorted, 75.0);

        Ok(Self {
            container_id: container_id.to_string(),
            metric_type,
            mean,
            std_dev,
            median: percentile(&sorted, 50.0),
            min,
            max,
            p25,
            p75,
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            iqr: p75 - p25,
            upper_bound: mean + threshold_multiplier * std_dev,
            lower_bound: mean - threshold_multiplier * std_dev,
            sample_count: values.len(),
            updated_at: now,
        })
    }

    pub fn is_outside(&self, value: f64) -> bool {
        value > self.upper_bound || value < self.lower_bound
    }
}

/// Standard deviation over the whole population (divisor n)
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linearly interpolated percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Severity from z-score magnitude: above 5 sigma is high, above 3 medium
pub fn severity_for(value: f64, mean: f64, std_dev: f64) -> Severity {
    if std_dev <= 0.0 {
        return Severity::Low;
    }
    let z = ((value - mean) / std_dev).abs();
    if z > 5.0 {
        Severity::High
    } else if z > 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
