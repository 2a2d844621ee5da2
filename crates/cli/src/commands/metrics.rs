//! Metric sample and host summary commands

use anyhow::Result;
use monitor_lib::collector::SystemMetrics;
use monitor_lib::models::{short_id, MetricPayload, MetricsByContainer};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::commands::TimeArgs;
use crate::output::{
    format_bytes, format_percent, format_rate, print_json, print_rows, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct SeriesRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Type")]
    metric_type: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Latest")]
    latest_at: String,
    #[tabled(rename = "Value")]
    latest: String,
}

#[derive(Tabled)]
struct SystemRow {
    #[tabled(rename = "Metric")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Latest reading rendered for a table cell
fn describe(payload: &MetricPayload) -> String {
    match payload {
        MetricPayload::Cpu(cpu) => format_percent(Some(cpu.usage_percent)),
        MetricPayload::Memory(mem) => format!(
            "{} ({} / {})",
            format_percent(Some(mem.usage_percent)),
            format_bytes(mem.usage as f64),
            format_bytes(mem.limit as f64)
        ),
        MetricPayload::Disk(disk) => format!(
            "read {} / write {}",
            format_bytes(disk.read_bytes as f64),
            format_bytes(disk.write_bytes as f64)
        ),
        MetricPayload::Network(net) => format!(
            "rx {} / tx {}",
            format_bytes(net.rx_bytes as f64),
            format_bytes(net.tx_bytes as f64)
        ),
        MetricPayload::Custom(values) => values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub async fn show_metrics(
    client: &ApiClient,
    container: Option<String>,
    metric_type: Option<String>,
    time: &TimeArgs,
    format: OutputFormat,
) -> Result<()> {
    let data: MetricsByContainer = client
        .get(
            "api/v1/metrics",
            &[
                ("container_id", container.as_deref()),
                ("metric_type", metric_type.as_deref()),
                ("start_time", time.start_time.as_deref()),
                ("end_time", time.end_time.as_deref()),
            ],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&data),
        OutputFormat::Table => {
            let rows: Vec<SeriesRow> = data
                .iter()
                .flat_map(|(id, by_type)| {
                    by_type.iter().filter_map(move |(t, samples)| {
                        let last = samples.last()?;
                        Some(SeriesRow {
                            container: short_id(id).to_string(),
                            metric_type: t.to_string(),
                            samples: samples.len(),
                            latest_at: last.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                            latest: describe(&last.payload),
                        })
                    })
                })
                .collect();

            if rows.is_empty() {
                print_warning("No metrics found");
                return Ok(());
            }
            print_rows(rows, "series");
            Ok(())
        }
    }
}

pub async fn show_system(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let system: SystemMetrics = client.get("api/v1/system", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&system),
        OutputFormat::Table => {
            let c = &system.containers;
            let rows = vec![
                SystemRow {
                    name: "Containers",
                    value: format!(
                        "{} total ({} running, {} paused, {} stopped)",
                        c.total, c.running, c.paused, c.stopped
                    ),
                },
                SystemRow {
                    name: "Average CPU",
                    value: format_percent(system.cpu_average_usage_percent),
                },
                SystemRow {
                    name: "Average memory",
                    value: format_percent(system.memory_average_usage_percent),
                },
                SystemRow {
                    name: "Disk read",
                    value: format_rate(system.disk_read_rate_bytes_per_sec),
                },
                SystemRow {
                    name: "Disk write",
                    value: format_rate(system.disk_write_rate_bytes_per_sec),
                },
                SystemRow {
                    name: "Network rx",
                    value: format_rate(system.network_rx_rate_bytes_per_sec),
                },
                SystemRow {
                    name: "Network tx",
                    value: format_rate(system.network_tx_rate_bytes_per_sec),
                },
            ];
            print_rows(rows, "metrics");
            Ok(())
        }
    }
}
