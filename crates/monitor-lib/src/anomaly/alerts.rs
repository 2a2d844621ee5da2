//! Grouping of emitted anomalies into notifications

use std::collections::BTreeMap;

use serde_json::json;

use super::Anomaly;
use crate::models::{short_id, Severity};
use crate::notifier::Notification;

pub const ANOMALY_CATEGORY: &str = "anomaly";

/// One notification per severity bucket for a container's new anomalies
pub fn build_notifications(container_id: &str, anomalies: &[Anomaly]) -> Vec<Notification> {
    let mut by_severity: BTreeMap<Severity, Vec<&Anomaly>> = BTreeMap::new();
    for anomaly in anomalies {
        by_severity.entry(anomaly.severity).or_default().push(anomaly);
    }

    by_severity
        .into_iter()
        .rev()
        .map(|(severity, bucket)| {
            let mut message = format!(
                "{} anomalies detected in container {}:\n\n",
                bucket.len(),
                container_id
            );
            for anomaly in &bucket {
                message.push_str(&format!("- {}\n", anomaly.description));
                message.push_str(&format!("  Timestamp: {}\n", anomaly.timestamp.to_rfc3339()));
                message.push_str(&format!("  Type: {}\n", anomaly.kind.name()));
                message.push_str(&format!("  Severity: {}\n\n", anomaly.severity.level()));
            }

            Notification {
                subject: format!(
                    "{} anomalies detected in container {}",
                    bucket.len(),
                    short_id(container_id)
                ),
                message,
                severity,
                category: ANOMALY_CATEGORY.to_string(),
                metadata: json!({
                    "container_id": container_id,
                    "anomalies": bucket,
                }),
            }
        })
        .collect()
}
