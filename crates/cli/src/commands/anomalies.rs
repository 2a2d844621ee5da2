//! Anomaly and baseline commands

use anyhow::Result;
use monitor_lib::anomaly::{AnomaliesByContainer, BaselinesByContainer};
use monitor_lib::models::short_id;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::commands::TimeArgs;
use crate::output::{color_severity, print_json, print_rows, print_warning, truncate, OutputFormat};

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Type")]
    metric_type: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Type")]
    metric_type: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std dev")]
    std_dev: String,
    #[tabled(rename = "P95")]
    p95: String,
    #[tabled(rename = "Bounds")]
    bounds: String,
    #[tabled(rename = "Samples")]
    samples: usize,
}

pub async fn show_anomalies(
    client: &ApiClient,
    container: Option<String>,
    metric_type: Option<String>,
    severity: Option<String>,
    time: &TimeArgs,
    format: OutputFormat,
) -> Result<()> {
    let data: AnomaliesByContainer = client
        .get(
            "api/v1/anomalies",
            &[
                ("container_id", container.as_deref()),
                ("metric_type", metric_type.as_deref()),
                ("severity", severity.as_deref()),
                ("start_time", time.start_time.as_deref()),
                ("end_time", time.end_time.as_deref()),
            ],
        )
        .await?;

    if let OutputFormat::Json = format {
        return print_json(&data);
    }

    let mut anomalies: Vec<_> = data.values().flatten().collect();
    if anomalies.is_empty() {
        print_warning("No anomalies found");
        return Ok(());
    }
    anomalies.sort_by_key(|a| a.timestamp);

    let rows: Vec<AnomalyRow> = anomalies
        .into_iter()
        .map(|a| AnomalyRow {
            timestamp: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            container: short_id(&a.container_id).to_string(),
            metric_type: a.metric_type.to_string(),
            kind: a.kind.to_string(),
            value: format!("{:.2}", a.value),
            expected: format!("{:.2}", a.expected),
            severity: color_severity(a.severity),
            description: truncate(&a.description, 60),
        })
        .collect();
    print_rows(rows, "anomalies");
    Ok(())
}

pub async fn show_baselines(
    client: &ApiClient,
    container: Option<String>,
    metric_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let data: BaselinesByContainer = client
        .get(
            "api/v1/baselines",
            &[
                ("container_id", container.as_deref()),
                ("metric_type", metric_type.as_deref()),
            ],
        )
        .await?;

    if let OutputFormat::Json = format {
        return print_json(&data);
    }

    let rows: Vec<BaselineRow> = data
        .values()
        .flat_map(|by_type| by_type.values())
        .map(|b| BaselineRow {
            container: short_id(&b.container_id).to_string(),
            metric_type: b.metric_type.to_string(),
            mean: format!("{:.2}", b.mean),
            std_dev: format!("{:.2}", b.std_dev),
            p95: format!("{:.2}", b.p95),
            bounds: format!("{:.2} .. {:.2}", b.lower_bound, b.upper_bound),
            samples: b.sample_count,
        })
        .collect();

    if rows.is_empty() {
        print_warning("No baselines computed yet");
        return Ok(());
    }
    print_rows(rows, "baselines");
    Ok(())
}
