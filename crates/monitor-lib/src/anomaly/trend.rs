//! Sustained trend detection
//!
//! Smooths the series with a short moving average and flags slopes that
//! exceed a fraction of the baseline mean per data point.

use chrono::{DateTime, Utc};

use super::baseline::Baseline;
use super::{Anomaly, AnomalyKind, TrendDirection};
use crate::models::Severity;

/// Minimum samples required for trend detection
const MIN_SAMPLES_FOR_TREND: usize = 5;

/// Moving average window upper bound
const MAX_WINDOW: usize = 5;

/// Normalized slope above which a trend is reported (10% per point)
const DEFAULT_TREND_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct TrendDetector {
    pub threshold: f64,
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_TREND_THRESHOLD,
        }
    }
}

impl TrendDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect a sustained slope over the series
    ///
    /// # Returns
    /// * `Some(Anomaly)` placed at the latest sample when the normalized
    ///   slope exceeds the threshold
    /// * `None` otherwise, or with fewer than five samples
    pub fn detect(&self, baseline: &Baseline, points: &[(DateTime<Utc>, f64)]) -> Option<Anomaly> {
        if points.len() < MIN_SAMPLES_FOR_TREND {
            return None;
        }

        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let averages = moving_average(&values, MAX_WINDOW.min(values.len()));
        if averages.len() < 2 {
            return None;
        }

        let first = averages[0];
        let last = averages[averages.len() - 1];
        let trend = (last - first) / (averages.len() - 1) as f64;
        let normalized_trend = if baseline.mean > 0.0 {
            trend / baseline.mean
        } else {
            0.0
        };

        if normalized_trend.abs() <= self.threshold {
            return None;
        }

        let (timestamp, value) = *points.last()?;
        let direction = if trend > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };
        let change = match direction {
            TrendDirection::Increasing => "increase",
            TrendDirection::Decreasing => "decrease",
        };

        Some(Anomaly {
            container_id: baseline.container_id.clone(),
            metric_type: baseline.metric_type,
            timestamp,
            value,
            expected: baseline.mean,
            deviation: normalized_trend,
            kind: AnomalyKind::Trend {
                trend,
                normalized_trend,
                direction,
            },
            severity: Severity::from_level((normalized_trend.abs() * 10.0).floor() as i64),
            description: format!(
                "Abnormal {} {} detected: {:.2}% change per data point",
                baseline.metric_type,
                change,
                normalized_trend * 100.0
            ),
        })
    }
}

/// Full-overlap moving average; yields `len - window + 1` points
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricType;
    use chrono::Duration;

    fn series(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let t0 = Utc::now() - Duration::hours(values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (t0 + Duration::hours(i as i64), *v))
            .collect()
    }

    fn baseline_of(points: &[(DateTime<Utc>, f64)]) -> Baseline {
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        Baseline::compute("c1", MetricType::Memory, &values, 3.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 2).is_empty());
    }

    #[test]
    fn test_steep_increase_is_flagged() {
        let points = series(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]);
        let b = baseline_of(&points);
        let anomaly = TrendDetector::new().detect(&b, &points).unwrap();

        // averages 30..60 over 4 points, slope 10, mean 45
        match anomaly.kind {
            AnomalyKind::Trend {
                trend,
                normalized_trend,
                direction,
            } => {
                assert_eq!(trend, 10.0);
                assert!((normalized_trend - 10.0 / 45.0).abs() < 1e-12);
                assert_eq!(direction, TrendDirection::Increasing);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(anomaly.severity, Severity::Medium);
        assert_eq!(anomaly.value, 80.0);
        assert_eq!(anomaly.timestamp, points[7].0);
        assert_eq!(
            anomaly.description,
            "Abnormal memory increase detected: 22.22% change per data point"
        );
    }

    #[test]
    fn test_five_samples_leave_single_average() {
        let points = series(&[10.0, 90.0, 10.0, 90.0, 10.0]);
        let b = baseline_of(&points);
        assert!(TrendDetector::new().detect(&b, &points).is_none());
    }

    #[test]
    fn test_gentle_or_short_series_is_ignored() {
        let gentle = series(&[40.0, 40.5, 41.0, 41.5, 42.0, 42.5, 43.0]);
        assert!(TrendDetector::new().detect(&baseline_of(&gentle), &gentle).is_none());

        let short = series(&[1.0, 50.0, 100.0, 200.0]);
        assert!(TrendDetector::new().detect(&baseline_of(&short), &short).is_none());
    }

    #[test]
    fn test_decrease_direction() {
        let points = series(&[90.0, 80.0, 60.0, 40.0, 20.0, 10.0, 5.0]);
        let b = baseline_of(&points);
        let anomaly = TrendDetector::new().detect(&b, &points).unwrap();
        assert!(matches!(
            anomaly.kind,
            AnomalyKind::Trend {
                direction: TrendDirection::Decreasing,
                ..
            }
        ));
        assert!(anomaly.description.contains("decrease"));
    }
}
