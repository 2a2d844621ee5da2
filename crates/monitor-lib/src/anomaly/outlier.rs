//! Baseline-bound outlier detection
//!
//! Flags every sample that falls outside the baseline's
//! `[lower_bound, upper_bound]` band.

use chrono::{DateTime, Utc};

use super::baseline::{severity_for, Baseline};
use super::{Anomaly, AnomalyKind};

/// Detects samples outside the mean +/- k sigma band
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlierDetector;

impl OutlierDetector {
    pub fn new() -> Self {
        Self
    }

    /// Check every point of a series against its baseline
    ///
    /// # Arguments
    /// * `baseline` - Baseline computed from the same lookback window
    /// * `points` - Time-ordered `(timestamp, value)` pairs
    ///
    /// # Returns
    /// Candidates in time order; empty when the series has no spread
    pub fn detect(&self, baseline: &Baseline, points: &[(DateTime<Utc>, f64)]) -> Vec<Anomaly> {
        if baseline.std_dev < f64::EPSILON {
            return Vec::new();
        }

        points
            .iter()
            .filter(|(_, value)| baseline.is_outside(*value))
            .map(|(timestamp, value)| {
                let threshold = if *value > baseline.upper_bound {
                    baseline.upper_bound
                } else {
                    baseline.lower_bound
                };
                Anomaly {
                    container_id: baseline.container_id.clone(),
                    metric_type: baseline.metric_type,
                    timestamp: *timestamp,
                    value: *value,
                    expected: baseline.mean,
                    deviation: (value - baseline.mean) / baseline.std_dev,
                    kind: AnomalyKind::Outlier { threshold },
                    severity: severity_for(*value, baseline.mean, baseline.std_dev),
                    description: format!(
                        "Abnormal {} usage detected: {:.2} (baseline: {:.2})",
                        baseline.metric_type, value, baseline.mean
                    ),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricType, Severity};
    use chrono::Duration;

    fn baseline(mean: f64, std_dev: f64, k: f64) -> Baseline {
        Baseline {
            container_id: "c1".to_string(),
            metric_type: MetricType::Cpu,
            mean,
            std_dev,
            median: mean,
            min: mean,
            max: mean,
            p25: mean,
            p75: mean,
            p90: mean,
            p95: mean,
            p99: mean,
            iqr: 0.0,
            upper_bound: mean + k * std_dev,
            lower_bound: mean - k * std_dev,
            sample_count: 10,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_flags_only_out_of_band_points() {
        let b = baseline(50.0, 10.0, 3.0);
        let t0 = Utc::now();
        let points = vec![
            (t0, 55.0),
            (t0 + Duration::seconds(1), 95.0),
            (t0 + Duration::seconds(2), 10.0),
            (t0 + Duration::seconds(3), 80.0),
        ];

        let found = OutlierDetector::new().detect(&b, &points);
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].value, 95.0);
        assert_eq!(found[0].kind, AnomalyKind::Outlier { threshold: 80.0 });
        assert_eq!(found[0].severity, Severity::Medium);
        assert_eq!(found[0].deviation, 4.5);
        assert_eq!(
            found[0].description,
            "Abnormal cpu usage detected: 95.00 (baseline: 50.00)"
        );

        assert_eq!(found[1].kind, AnomalyKind::Outlier { threshold: 20.0 });
        assert_eq!(found[1].deviation, -4.0);
    }

    #[test]
    fn test_flat_baseline_flags_nothing() {
        let b = baseline(0.1, 0.0, 3.0);
        let points = vec![(Utc::now(), 0.1); 12];
        assert!(OutlierDetector::new().detect(&b, &points).is_empty());
    }
}
