//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
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

/// Format a percentage with two decimals
pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Color a pass percentage: full marks green, partial yellow, none red
pub fn color_pass_percent(percent: f64) -> String {
    let formatted = format_percent(percent);
    if percent >= 100.0 {
        formatted.green().to_string()
    } else if percent > 0.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Format a latency in milliseconds
pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.2} ms", latency_ms)
}

/// Color rule state or probe outcome
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "created" => status.yellow().to_string(),
        "registered" => status.blue().to_string(),
        "running" | "pass" | "up" | "healthy" => status.green().to_string(),
        "stopped" | "degraded" => status.yellow().to_string(),
        "fail" | "down" | "unhealthy" | "error" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Render a unix timestamp as RFC 3339
pub fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
