//! Hour-of-day seasonality detection

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};

use super::baseline::{population_std_dev, severity_for, Baseline};
use super::{Anomaly, AnomalyKind};

/// Minimum samples for an hourly profile
const MIN_SAMPLES_FOR_SEASONALITY: usize = 24;

/// Minimum points in one hour bucket
const MIN_POINTS_PER_HOUR: usize = 3;

/// Compares the latest sample against the profile of its own UTC hour
#[derive(Debug, Clone, Copy)]
pub struct SeasonalityDetector {
    pub threshold_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HourStats {
    mean: f64,
    std_dev: f64,
}

impl SeasonalityDetector {
    pub fn new(threshold_multiplier: f64) -> Self {
        Self {
            threshold_multiplier,
        }
    }

    pub fn detect(&self, baseline: &Baseline, points: &[(DateTime<Utc>, f64)]) -> Option<Anomaly> {
        if points.len() < MIN_SAMPLES_FOR_SEASONALITY {
            return None;
        }

        let profile = hourly_profile(points);
        let (timestamp, value) = *points.last()?;
        let hour = timestamp.hour();
        let stats = profile.get(&hour)?;

        if stats.std_dev <= 0.0 {
            return None;
        }
        let z = (value - stats.mean) / stats.std_dev;
        if z.abs() <= self.threshold_multiplier {
            return None;
        }

        Some(Anomaly {
            container_id: baseline.container_id.clone(),
            metric_type: baseline.metric_type,
            timestamp,
            value,
            expected: stats.mean,
            deviation: z,
            kind: AnomalyKind::Seasonality { hour },
            severity: severity_for(value, stats.mean, stats.std_dev),
            description: format!(
                "Abnormal {} usage for hour {}: {:.2} (expected: {:.2})",
                baseline.metric_type, hour, value, stats.mean
            ),
        })
    }
}

/// Mean and spread per UTC hour, for hours with enough points
fn hourly_profile(points: &[(DateTime<Utc>, f64)]) -> BTreeMap<u32, HourStats> {
    let mut buckets: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (ts, value) in points {
        buckets.entry(ts.hour()).or_default().push(*value);
    }

    buckets
        .into_iter()
        .filter(|(_, values)| values.len() >= MIN_POINTS_PER_HOUR)
        .map(|(hour, values)| {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let std_dev = population_std_dev(&values, mean);
            (hour, HourStats { mean, std_dev })
        })
        .collect()
}
