//! User-defined metrics read from commands, labels or environment

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::{CustomMetric, CustomMetricSource};
use crate::error::CollectorError;
use crate::runtime::{ContainerAttrs, ContainerRuntime};

/// Collect every configured custom metric for one container.
///
/// A failing metric is logged and left out; the rest are still returned.
pub async fn collect_custom_metrics(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    definitions: &[CustomMetric],
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    let mut attrs: Option<ContainerAttrs> = None;

    for definition in definitions {
        match read_metric(runtime, container_id, definition, &mut attrs).await {
            Ok(Some(value)) => {
                values.insert(definition.name.clone(), value);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    container_id = %container_id,
                    metric = %definition.name,
                    error = %e,
                    "Failed to collect custom metric"
                );
            }
        }
    }

    values
}

async fn read_metric(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    definition: &CustomMetric,
    attrs: &mut Option<ContainerAttrs>,
) -> Result<Option<String>, CollectorError> {
    match definition.source {
        CustomMetricSource::Command => {
            let Some(command) = definition.command.as_deref() else {
                return Ok(None);
            };
            let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
            let output = runtime.exec(container_id, &argv).await?;
            Ok((output.exit_code == Some(0)).then(|| output.stdout.trim().to_string()))
        }
        CustomMetricSource::Label => {
            let Some(label) = definition.label.as_deref() else {
                return Ok(None);
            };
            let attrs = cached_attrs(runtime, container_id, attrs).await?;
            Ok(attrs.labels.get(label).cloned())
        }
        CustomMetricSource::Env => {
            let Some(var) = definition.env_var.as_deref() else {
                return Ok(None);
            };
            let attrs = cached_attrs(runtime, container_id, attrs).await?;
            let prefix = format!("{}=", var);
            Ok(attrs
                .env
                .iter()
                .find_map(|entry| entry.strip_prefix(&prefix).map(str::to_string)))
        }
    }
}

async fn cached_attrs<'a>(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    attrs: &'a mut Option<ContainerAttrs>,
) -> Result<&'a ContainerAttrs, CollectorError> {
    if attrs.is_none() {
        *attrs = Some(runtime.inspect(container_id).await?);
    }
    attrs.as_ref().ok_or_else(|| CollectorError::Inspect {
        container_id: container_id.to_string(),
        message: "attributes unavailable".to_string(),
    })
}
