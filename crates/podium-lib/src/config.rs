//! Runtime configuration for the coordinator
//!
//! Components never cache settings; they hold a [`ConfigProvider`] and ask
//! for a fresh snapshot whenever a decision depends on configuration, so a
//! `set_param` or an edited config file takes effect on the next call.

use crate::error::{PodiumError, PodiumResult};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment prefix for settings (e.g. `PODIUM_MAX_QUEUE_SIZE`)
pub const ENV_PREFIX: &str = "PODIUM";

/// Default capacity of each bounded record queue
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50_000;

/// Named coordinator parameters
///
/// Field names double as parameter names: `set_param("MAX_QUEUE_SIZE", ..)`
/// addresses `max_queue_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodiumSettings {
    /// Seconds to wait for a freshly provisioned agent to answer
    pub lydian_service_wait_time: u64,
    /// Interface name prefixes whose addresses count as endpoints
    pub namespace_interface_name_prefixes: Vec<String>,
    /// Upper bound on concurrent per-host dispatch tasks
    pub node_prep_max_thread: usize,
    pub max_queue_size: usize,
    /// Register listeners on all server hosts before any client host
    pub traffic_start_servers_first: bool,
    /// Seconds between a probe completing and its record being queryable
    pub traffic_stats_query_latency: u64,
    pub wavefront_traffic_recording: bool,
    pub wavefront_resource_recording: bool,
    pub wavefront_server: String,
    pub wavefront_token: String,
    pub wavefront_source_tag: String,
    pub wavefront_batch_size: usize,
    /// Seconds between resource samples
    pub resource_monitor_interval: u64,
    pub agent_rpc_port: u16,
    /// Seconds before an agent RPC is abandoned as a host failure
    pub agent_rpc_timeout: u64,
    pub endpoint_username: String,
    pub endpoint_password: String,
    pub testbed_name: String,
    pub test_id: String,
}

impl Default for PodiumSettings {
    fn default() -> Self {
        Self {
            lydian_service_wait_time: 60,
            namespace_interface_name_prefixes: vec![
                "eth".to_string(),
                "ens".to_string(),
                "veth".to_string(),
            ],
            node_prep_max_thread: 64,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            traffic_start_servers_first: true,
            traffic_stats_query_latency: 2,
            wavefront_traffic_recording: false,
            wavefront_resource_recording: false,
            wavefront_server: String::new(),
            wavefront_token: String::new(),
            wavefront_source_tag: "podium".to_string(),
            wavefront_batch_size: 100,
            resource_monitor_interval: 8,
            agent_rpc_port: 5649,
            agent_rpc_timeout: 30,
            endpoint_username: "root".to_string(),
            endpoint_password: String::new(),
            testbed_name: String::new(),
            test_id: String::new(),
        }
    }
}

impl PodiumSettings {
    pub fn service_wait_time(&self) -> Duration {
        Duration::from_secs(self.lydian_service_wait_time)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.resource_monitor_interval.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_rpc_timeout)
    }

    /// Whether an interface name matches one of the recognised prefixes
    pub fn is_endpoint_interface(&self, name: &str) -> bool {
        self.namespace_interface_name_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Look up a parameter by name (case-insensitive)
    pub fn get_param(&self, name: &str) -> Option<Value> {
        let value = serde_json::to_value(self).ok()?;
        value.get(name.to_ascii_lowercase().as_str()).cloned()
    }

    /// Set a parameter by name from its textual form
    ///
    /// The text is parsed as JSON first and falls back to a plain string;
    /// list parameters also accept a comma separated value.
    pub fn set_param(&mut self, name: &str, raw: &str) -> PodiumResult<()> {
        let key = name.to_ascii_lowercase();
        let mut current = serde_json::to_value(&*self)
            .map_err(|e| PodiumError::Config(e.to_string()))?;
        let slot = current
            .get_mut(key.as_str())
            .ok_or_else(|| PodiumError::Config(format!("unknown parameter {name}")))?;

        let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| {
            if slot.is_array() {
                Value::Array(
                    raw.split(',')
                        .map(|s| Value::String(s.trim().to_string()))
                        .filter(|v| v.as_str().map_or(false, |s| !s.is_empty()))
                        .collect(),
                )
            } else {
                Value::String(raw.to_string())
            }
        });
        *slot = parsed;

        *self = serde_json::from_value(current)
            .map_err(|e| PodiumError::Config(format!("bad value for {name}: {e}")))?;
        Ok(())
    }
}

/// Source of live settings
pub trait ConfigProvider: Send + Sync {
    /// Current settings, resolved at call time
    fn settings(&self) -> PodiumSettings;
}

pub type SharedConfig = Arc<dyn ConfigProvider>;

/// Fixed settings, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub PodiumSettings);

impl ConfigProvider for StaticConfig {
    fn settings(&self) -> PodiumSettings {
        self.0.clone()
    }
}

/// Settings that can change while the coordinator runs
#[derive(Debug)]
pub struct LiveConfig {
    settings: RwLock<PodiumSettings>,
    path: Option<PathBuf>,
}

impl LiveConfig {
    pub fn new(settings: PodiumSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            path: None,
        }
    }

    /// Load defaults, then the optional file, then `PODIUM_*` environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = read_settings(path)?;
        Ok(Self {
            settings: RwLock::new(settings),
            path: path.map(Path::to_path_buf),
        })
    }

    /// Re-read the backing file and environment
    pub fn reload(&self) -> Result<()> {
        let fresh = read_settings(self.path.as_deref())?;
        let mut guard = self
            .settings
            .write()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?;
        *guard = fresh;
        info!("Configuration reloaded");
        Ok(())
    }

    pub fn get_param(&self, name: &str) -> Option<Value> {
        self.settings().get_param(name)
    }

    pub fn set_param(&self, name: &str, value: &str) -> PodiumResult<()> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| PodiumError::Config("settings lock poisoned".into()))?;
        guard.set_param(name, value)?;
        info!(param = %name, value = %value, "Parameter updated");
        Ok(())
    }

    /// Reload whenever the backing file changes
    ///
    /// Watching stops when the returned handle is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<ConfigWatcher> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no configuration file to watch"))?;
        let live = Arc::clone(self);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    debug!(paths = ?event.paths, "Configuration file changed");
                    if let Err(e) = live.reload() {
                        warn!(error = %e, "Failed to reload configuration, keeping previous");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Configuration watch error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create configuration watcher")?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        info!(path = %path.display(), "Watching configuration file");

        Ok(ConfigWatcher { _watcher: watcher })
    }
}

impl ConfigProvider for LiveConfig {
    fn settings(&self) -> PodiumSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Keeps a configuration file watch alive
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

fn read_settings(path: Option<&Path>) -> Result<PodiumSettings> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("namespace_interface_name_prefixes"),
        )
        .build()
        .context("Failed to build configuration")?;

    settings
        .try_deserialize()
        .context("Failed to parse configuration")
}
