//! Recommendation and report commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use monitor_lib::models::short_id;
use monitor_lib::optimizer::RecommendationsByContainer;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::commands::TimeArgs;
use crate::output::{
    color_impact, print_json, print_rows, print_success, print_warning, truncate, OutputFormat,
};

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Impact")]
    impact: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub async fn show_recommendations(
    client: &ApiClient,
    container: Option<String>,
    category: Option<String>,
    resource: Option<String>,
    time: &TimeArgs,
    format: OutputFormat,
) -> Result<()> {
    let data: RecommendationsByContainer = client
        .get(
            "api/v1/recommendations",
            &[
                ("container_id", container.as_deref()),
                ("category", category.as_deref()),
                ("resource", resource.as_deref()),
                ("start_time", time.start_time.as_deref()),
                ("end_time", time.end_time.as_deref()),
            ],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&data),
        OutputFormat::Table => {
            let rows: Vec<RecommendationRow> = data
                .values()
                .flatten()
                .map(|r| RecommendationRow {
                    container: short_id(&r.container_id).to_string(),
                    category: r.category.to_string(),
                    resource: r.resource.to_string(),
                    action: r.action.to_string(),
                    impact: color_impact(r.impact),
                    description: truncate(&r.description, 70),
                })
                .collect();

            if rows.is_empty() {
                print_warning("No recommendations found");
                return Ok(());
            }
            print_rows(rows, "recommendations");

            let commands: Vec<&str> = data
                .values()
                .flatten()
                .filter_map(|r| r.command.as_deref())
                .collect();
            if !commands.is_empty() {
                println!("\nSuggested commands:");
                for command in commands {
                    println!("  {}", command);
                }
            }
            Ok(())
        }
    }
}

/// Fetch the rendered report and print it or write it to `output`
pub async fn show_report(
    client: &ApiClient,
    container: Option<String>,
    report_format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let report = client
        .get_text(
            "api/v1/report",
            &[
                ("container_id", container.as_deref()),
                ("format", Some(report_format)),
            ],
        )
        .await?;

    match output {
        Some(path) => {
            std::fs::write(&path, report)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            print_success(&format!("Report written to {}", path.display()));
        }
        None => println!("{}", report),
    }
    Ok(())
}
