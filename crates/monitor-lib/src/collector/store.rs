//! Bounded in-memory time series, one per (container, metric type)

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::models::{MetricSample, MetricType, MetricsByContainer};
use crate::query::TimeRange;

/// Time-ordered sample store. Not synchronized; the collector wraps it in
/// a single lock.
#[derive(Debug, Default)]
pub struct MetricStore {
    series: BTreeMap<String, BTreeMap<MetricType, VecDeque<MetricSample>>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, keeping each series ordered by timestamp.
    ///
    /// Samples with equal timestamps keep their insertion order.
    pub fn append(&mut self, sample: MetricSample) {
        let series = self
            .series
            .entry(sample.container_id.clone())
            .or_default()
            .entry(sample.metric_type())
            .or_default();

        match series.back() {
            Some(last) if last.timestamp > sample.timestamp => {
                let idx = series.partition_point(|s| s.timestamp <= sample.timestamp);
                series.insert(idx, sample);
            }
            _ => series.push_back(sample),
        }
    }

    /// Drop samples older than `cutoff`; returns how many were removed.
    pub fn cleanup(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;

        for types in self.series.values_mut() {
            for series in types.values_mut() {
                while series.front().is_some_and(|s| s.timestamp < cutoff) {
                    series.pop_front();
                    removed += 1;
                }
            }
            types.retain(|_, series| !series.is_empty());
        }
        self.series.retain(|_, types| !types.is_empty());

        removed
    }

    /// Filtered copy; unset filters are wildcards, empty series are omitted.
    pub fn query(
        &self,
        container_id: Option<&str>,
        metric_type: Option<MetricType>,
        range: TimeRange,
    ) -> MetricsByContainer {
        let mut result = MetricsByContainer::new();

        let containers = self
            .series
            .iter()
            .filter(|(id, _)| container_id.map_or(true, |wanted| wanted == id.as_str()));

        for (id, types) in containers {
            let mut by_type = BTreeMap::new();
            for (t, series) in types {
                if metric_type.is_some_and(|wanted| wanted != *t) {
                    continue;
                }
                let samples: Vec<MetricSample> = series
                    .iter()
                    .filter(|s| range.contains(s.timestamp))
                    .cloned()
                    .collect();
                if !samples.is_empty() {
                    by_type.insert(*t, samples);
                }
            }
            if !by_type.is_empty() {
                result.insert(id.clone(), by_type);
            }
        }

        result
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn container_count(&self) -> usize {
        self.series.len()
    }

    pub fn sample_count(&self) -> usize {
        self.series
            .values()
            .flat_map(|types| types.values())
            .map(VecDeque::len)
            .sum()
    }
}
