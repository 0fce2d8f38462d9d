//! Host management commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{
    AddHostsRequest, AddHostsResponse, ApiClient, EndpointResponse, HostUpResponse, HostsResponse,
    MonitorStatus, StopServiceRequest,
};
use crate::output::{
    color_status, print_info, print_json, print_success, print_table, print_warning, OutputFormat,
};

#[derive(Tabled, Serialize)]
struct AddedRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Endpoints Added")]
    endpoints: usize,
}

/// Provision hosts and learn their endpoints
pub async fn add_hosts(client: &ApiClient, hosts: Vec<String>, format: OutputFormat) -> Result<()> {
    let requested = hosts.clone();
    let response: AddHostsResponse = client
        .post("api/v1/hosts", &AddHostsRequest { hosts })
        .await?;

    if format == OutputFormat::Json {
        print_json(&response);
        return Ok(());
    }

    let rows: Vec<AddedRow> = response
        .added
        .iter()
        .map(|(host, endpoints)| AddedRow {
            host: host.clone(),
            endpoints: *endpoints,
        })
        .collect();
    print_table(&rows, format);

    let failed: Vec<&String> = requested
        .iter()
        .filter(|h| !response.added.contains_key(h.as_str()))
        .collect();
    if failed.is_empty() {
        print_success(&format!("{} hosts added", response.added.len()));
    } else {
        for host in failed {
            print_warning(&format!("Host {} could not be added", host.red()));
        }
    }
    Ok(())
}

/// Uninstall the agent from hosts
pub async fn stop_service(
    client: &ApiClient,
    hosts: Vec<String>,
    remove_db: bool,
    format: OutputFormat,
) -> Result<()> {
    let response: HostsResponse = client
        .post("api/v1/hosts/stop", &StopServiceRequest { hosts, remove_db })
        .await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            print_success(&format!("Service stopped on {} hosts", response.hosts.len()));
            for host in &response.hosts {
                println!("  {}", host);
            }
        }
    }
    Ok(())
}

/// Check whether the agent on a host answers
pub async fn host_up(client: &ApiClient, host: &str, format: OutputFormat) -> Result<()> {
    let response: HostUpResponse = client.get(&format!("api/v1/hosts/{}/up", host)).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            let state = if response.up { "up" } else { "down" };
            println!("{}: {}", response.host.bold(), color_status(state));
        }
    }
    Ok(())
}

/// Show which host owns an endpoint
pub async fn endpoint_host(client: &ApiClient, endpoint: &str, format: OutputFormat) -> Result<()> {
    let response: EndpointResponse = client
        .get(&format!("api/v1/endpoints/{}", endpoint))
        .await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => println!("{} -> {}", response.endpoint, response.host.cyan()),
    }
    Ok(())
}

/// Turn resource monitoring on a host on or off
pub async fn set_monitoring(client: &ApiClient, host: &str, enable: bool) -> Result<()> {
    let action = if enable { "start" } else { "stop" };
    client
        .post_no_content(
            &format!("api/v1/hosts/{}/monitor/{}", host, action),
            &serde_json::Value::Null,
        )
        .await?;
    print_success(&format!("Resource monitoring {}ed on {}", action, host));
    Ok(())
}

/// Start or stop a packet capture on a host
pub async fn pcap(
    client: &ApiClient,
    host: &str,
    file: String,
    interface: Option<String>,
    args: Option<String>,
    stop: bool,
) -> Result<()> {
    let action = if stop { "stop" } else { "start" };
    let body = serde_json::json!({
        "file": file,
        "interface": interface.unwrap_or_default(),
        "args": args.unwrap_or_default(),
    });
    client
        .post_no_content(&format!("api/v1/hosts/{}/pcap/{}", host, action), &body)
        .await?;
    print_success(&format!("Capture {} {}ed on {}", file, action, host));
    Ok(())
}

/// Show the coordinator's own monitor
pub async fn monitor_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: MonitorStatus = client.get("api/v1/monitor").await?;

    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Table => {
            let on_off = |running: bool| color_status(if running { "running" } else { "stopped" });
            println!("{}", "Primary Monitor".bold());
            println!("{}", "=".repeat(40));
            println!("Record manager:   {}", on_off(status.record_manager));
            println!("Resource sampler: {}", on_off(status.resource_sampler));
            println!("Mock traffic:     {}", on_off(status.mock_traffic));
            println!("Traffic queue:    {}", status.traffic_queue_depth);
            println!("Resource queue:   {}", status.resource_queue_depth);
            if !status.record_manager {
                print_info("Records are not being drained");
            }
        }
    }
    Ok(())
}
