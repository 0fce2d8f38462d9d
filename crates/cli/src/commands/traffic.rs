//! Traffic registration and control commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{
    ApiClient, HostsResponse, MeshRequest, ReqidResponse, RunTrafficRequest, TrafficRule,
};
use crate::output::{color_status, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for the rules table
#[derive(Tabled, Serialize)]
struct RuleRow {
    #[tabled(rename = "Rule ID")]
    ruleid: String,
    #[tabled(rename = "Source")]
    src: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Expect")]
    expect: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&TrafficRule> for RuleRow {
    fn from(rule: &TrafficRule) -> Self {
        Self {
            ruleid: rule.ruleid.clone(),
            src: rule.src.clone(),
            dst: rule.dst.clone(),
            port: rule.port,
            protocol: rule.protocol.clone(),
            expect: if rule.connected { "pass" } else { "fail" }.to_string(),
            state: color_status(&rule.state),
        }
    }
}

fn print_reqid(response: &ReqidResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Table => {
            print_success("Traffic registered");
            println!("Request ID: {}", response.reqid.cyan());
        }
    }
}

/// Register a single probe
pub async fn run(
    client: &ApiClient,
    request: RunTrafficRequest,
    format: OutputFormat,
) -> Result<()> {
    let response: ReqidResponse = client.post("api/v1/traffic", &request).await?;
    print_reqid(&response, format);
    Ok(())
}

/// Register a probe for every ordered pair of hosts
pub async fn mesh(client: &ApiClient, request: MeshRequest, format: OutputFormat) -> Result<()> {
    let response: ReqidResponse = client.post("api/v1/traffic/mesh", &request).await?;
    print_reqid(&response, format);
    Ok(())
}

/// Start or stop every rule of a request
pub async fn control(client: &ApiClient, reqid: &str, start: bool, format: OutputFormat) -> Result<()> {
    let action = if start { "start" } else { "stop" };
    let response: HostsResponse = client
        .post(
            &format!("api/v1/traffic/{}/{}", reqid, action),
            &serde_json::Value::Null,
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            if response.hosts.is_empty() {
                print_warning(&format!("No host acknowledged {} for {}", action, reqid));
            } else {
                print_success(&format!(
                    "{} acknowledged by {} hosts",
                    action,
                    response.hosts.len()
                ));
            }
        }
    }
    Ok(())
}

/// List the rules of a request
pub async fn rules(client: &ApiClient, reqid: &str, format: OutputFormat) -> Result<()> {
    let rules: Vec<TrafficRule> = client
        .get(&format!("api/v1/traffic/{}/rules", reqid))
        .await?;

    match format {
        OutputFormat::Json => print_json(&rules),
        OutputFormat::Table => {
            let rows: Vec<RuleRow> = rules.iter().map(RuleRow::from).collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

/// Feed placeholder records for a request through the coordinator's pipeline
pub async fn mock(client: &ApiClient, reqid: &str) -> Result<()> {
    client
        .post_no_content(
            &format!("api/v1/traffic/{}/mock", reqid),
            &serde_json::Value::Null,
        )
        .await?;
    print_success(&format!("Mock traffic started for {}", reqid));
    Ok(())
}
