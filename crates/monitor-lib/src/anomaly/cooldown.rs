//! Per-series alert deduplication
//!
//! Tracks the timestamp of the last emitted anomaly for each
//! (container, metric type) and suppresses candidates that fall within the
//! cooldown window of it. Timestamps come from the samples, not the clock.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::models::MetricType;

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    container_id: String,
    metric_type: MetricType,
}

pub struct AlertCooldown {
    window: Duration,
    last_alert: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl AlertCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check a candidate and record it when it is new.
    ///
    /// Returns `false` when the candidate lands within the window of the
    /// last emitted anomaly for the same series.
    pub fn admit(&self, container_id: &str, metric_type: MetricType, timestamp: DateTime<Utc>) -> bool {
        let key = CooldownKey {
            container_id: container_id.to_string(),
            metric_type,
        };

        let mut last_alert = self
            .last_alert
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = last_alert.get(&key) {
            if timestamp - *last < self.window {
                return false;
            }
        }
        last_alert.insert(key, timestamp);
        true
    }

    /// Forget series whose last alert is older than `cutoff`
    pub fn prune(&self, cutoff: DateTime<Utc>) {
        let mut last_alert = self
            .last_alert
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last_alert.retain(|_, ts| *ts >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.last_alert
            .lock()
            .map(|m| m.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
