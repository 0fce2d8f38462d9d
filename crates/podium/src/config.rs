//! Daemon configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Listen and file locations for the coordinator process
///
/// Fleet settings live in the file at `config_path` and are served by
/// `LiveConfig`; this struct only covers what the process itself needs.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Operator API, health and metrics port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Fleet settings file, watched for changes
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// Where registered rules are persisted across restarts
    #[serde(default)]
    pub rule_store_path: Option<PathBuf>,

    /// Name used in lifecycle log events
    #[serde(default = "default_coordinator_name")]
    pub coordinator_name: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_coordinator_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "podium".to_string())
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            config_path: None,
            rule_store_path: None,
            coordinator_name: default_coordinator_name(),
        }
    }
}

impl DaemonConfig {
    /// Load from `PODIUM_API_PORT`, `PODIUM_CONFIG_PATH` and friends
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PODIUM").try_parsing(true))
            .build()
            .context("Failed to read daemon environment")?;

        config
            .try_deserialize()
            .context("Failed to parse daemon configuration")
    }
}
