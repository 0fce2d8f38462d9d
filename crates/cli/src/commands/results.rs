//! Result, pass rate and latency queries

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, Latency, TrafficRecord, TrafficStats};
use crate::output::{
    color_pass_percent, color_status, format_latency, format_percent, format_timestamp,
    print_json, print_table, OutputFormat,
};

/// Row for the records table
#[derive(Tabled, Serialize)]
struct RecordRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Latency")]
    latency: String,
}

impl From<&TrafficRecord> for RecordRow {
    fn from(record: &TrafficRecord) -> Self {
        Self {
            time: format_timestamp(record.timestamp),
            source: record.source.clone(),
            destination: record.destination.clone(),
            port: record.port,
            protocol: record.protocol.clone(),
            result: color_status(if record.result { "pass" } else { "fail" }),
            latency: format_latency(record.latency),
        }
    }
}

/// Parse `key=value` record filters
pub fn parse_filters(filters: &[String]) -> Result<Vec<(String, String)>> {
    filters
        .iter()
        .map(|f| {
            f.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("Filter '{}' is not key=value", f))
        })
        .collect()
}

fn window(duration: Option<u64>) -> Vec<(String, String)> {
    duration
        .map(|d| vec![("duration".to_string(), d.to_string())])
        .unwrap_or_default()
}

/// Show the records of a request
pub async fn results(
    client: &ApiClient,
    reqid: &str,
    duration: Option<u64>,
    filters: &[String],
    format: OutputFormat,
) -> Result<()> {
    let mut query = window(duration);
    query.extend(parse_filters(filters)?);
    let records: Vec<TrafficRecord> = client
        .get_query(&format!("api/v1/traffic/{}/results", reqid), &query)
        .await?;

    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => {
            let rows: Vec<RecordRow> = records.iter().map(RecordRow::from).collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

/// Show pass and fail counts and percentages
pub async fn stats(
    client: &ApiClient,
    reqid: &str,
    duration: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let stats: TrafficStats = client
        .get_query(&format!("api/v1/traffic/{}/stats", reqid), &window(duration))
        .await?;

    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Table => {
            println!("{}", "Traffic Stats".bold());
            println!("{}", "=".repeat(40));
            println!("Request ID:   {}", stats.reqid.cyan());
            println!("Passed:       {}", stats.success);
            println!("Failed:       {}", stats.failure);
            println!("Pass rate:    {}", color_pass_percent(stats.pass_percent));
            println!("Fail rate:    {}", format_percent(stats.fail_percent));
        }
    }
    Ok(())
}

/// Show a latency reduction across the fleet
pub async fn latency(
    client: &ApiClient,
    reqid: &str,
    method: &str,
    duration: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = vec![("method".to_string(), method.to_string())];
    query.extend(window(duration));
    let latency: Latency = client
        .get_query(&format!("api/v1/traffic/{}/latency", reqid), &query)
        .await?;

    match format {
        OutputFormat::Json => print_json(&latency),
        OutputFormat::Table => println!(
            "{} latency for {}: {}",
            latency.method,
            latency.reqid.cyan(),
            format_latency(latency.latency).bold()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let filters = vec!["result=true".to_string(), "port = 80".to_string()];
        assert_eq!(
            parse_filters(&filters).unwrap(),
            vec![
                ("result".to_string(), "true".to_string()),
                ("port".to_string(), "80".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_filters_rejects_bare_key() {
        assert!(parse_filters(&["result".to_string()]).is_err());
    }
}
