//! Remote agent parameter commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ParamValue};
use crate::output::{print_json, print_success, print_warning, OutputFormat};

/// Read a parameter from the agent owning an endpoint
pub async fn get_param(
    client: &ApiClient,
    endpoint: &str,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let param: ParamValue = client
        .get(&format!("api/v1/params/{}/{}", endpoint, name))
        .await?;

    match format {
        OutputFormat::Json => print_json(&param),
        OutputFormat::Table => match &param.value {
            Some(value) => println!("{} = {}", name.bold(), value),
            None => print_warning(&format!("{} is not set on {}", name, endpoint)),
        },
    }
    Ok(())
}

/// Set a parameter on the agent owning an endpoint
pub async fn set_param(client: &ApiClient, endpoint: &str, name: &str, value: &str) -> Result<()> {
    client
        .put(
            &format!("api/v1/params/{}/{}", endpoint, name),
            &ParamValue {
                value: Some(value.to_string()),
            },
        )
        .await?;
    print_success(&format!("{} set to {} on {}", name, value, endpoint));
    Ok(())
}
