//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::models::Severity;
use monitor_lib::optimizer::Impact;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Pretty-print any serializable value
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table followed by a total line
pub fn print_rows<T: Tabled>(rows: Vec<T>, noun: &str) {
    let total = rows.len();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    println!("\nTotal: {} {}", total, noun);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.2}Gi", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes / KB)
    } else {
        format!("{:.0}B", bytes)
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "-".to_string(),
    }
}

pub fn color_severity(severity: Severity) -> String {
    match severity {
        Severity::Low => "low".green().to_string(),
        Severity::Medium => "medium".yellow().to_string(),
        Severity::High => "high".red().bold().to_string(),
    }
}

pub fn color_impact(impact: Impact) -> String {
    match impact {
        Impact::Low => impact.as_str().green().to_string(),
        Impact::Medium => impact.as_str().yellow().to_string(),
        Impact::High => impact.as_str().red().to_string(),
    }
}

pub fn color_running(running: bool) -> String {
    if running {
        "running".green().to_string()
    } else {
        "stopped".red().to_string()
    }
}

/// Trim a description to fit a table cell
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
