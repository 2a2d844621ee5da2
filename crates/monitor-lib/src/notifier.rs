//! Notification sink for detected anomalies
//!
//! Delivery channels live outside this crate. The daemon logs
//! notifications by default; unit tests record them in memory.

#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::Severity;

/// One aggregated alert for a container and severity bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
    pub severity: Severity,
    pub category: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the tracing pipeline
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        if notification.severity >= Severity::High {
            warn!(
                event = "notification",
                category = %notification.category,
                severity = notification.severity.level(),
                subject = %notification.subject,
                "{}",
                notification.message
            );
        } else {
            info!(
                event = "notification",
                category = %notification.category,
                severity = notification.severity.level(),
                subject = %notification.subject,
                "{}",
                notification.message
            );
        }
        Ok(())
    }
}

/// Keeps every notification in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        for (i, severity) in [Severity::Low, Severity::High].into_iter().enumerate() {
            notifier
                .send(Notification {
                    subject: format!("n{}", i),
                    message: String::new(),
                    severity,
                    category: "anomaly".to_string(),
                    metadata: serde_json::json!({}),
                })
                .await
                .unwrap();
        }

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].subject, "n1");
        assert_eq!(sent[1].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_log_notifier_accepts() {
        let n = Notification {
            subject: "s".to_string(),
            message: "m".to_string(),
            severity: Severity::Medium,
            category: "anomaly".to_string(),
            metadata: serde_json::Value::Null,
        };
        assert!(LogNotifier.send(n).await.is_ok());
    }
}
