//! Coordinator health
//!
//! Tracks the status of the coordinator's own components and the
//! reachability of every agent host as last observed by dispatch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but some hosts or subscribers are failing
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Outcome of the last dispatch to one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostHealth {
    pub reachable: bool,
    pub last_operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_seen_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub hosts: BTreeMap<String, HostHealth>,
}

impl HealthResponse {
    /// Unhealthy if any component is; degraded if any component is degraded
    /// or any host failed its last call
    pub fn compute_status(
        components: &HashMap<String, ComponentHealth>,
        hosts: &BTreeMap<String, HostHealth>,
    ) -> ComponentStatus {
        let mut degraded = hosts.values().any(|h| !h.reachable);
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => degraded = true,
                ComponentStatus::Healthy => {}
            }
        }
        if degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const DISPATCH: &str = "dispatch";
    pub const PIPELINE: &str = "pipeline";
    pub const MONITOR: &str = "monitor";
    pub const RECORDERS: &str = "recorders";
}

/// Shared health state; clones observe the same registry
#[derive(Debug, Clone, Default)]
pub struct FleetHealth {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    hosts: Arc<RwLock<BTreeMap<String, HostHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl FleetHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record how the last call to `host` went
    pub async fn record_host(&self, host: &str, operation: &str, error: Option<String>) {
        self.hosts.write().await.insert(
            host.to_string(),
            HostHealth {
                reachable: error.is_none(),
                last_operation: operation.to_string(),
                last_error: error,
                last_seen_timestamp: chrono::Utc::now().timestamp(),
            },
        );
    }

    pub async fn host(&self, host: &str) -> Option<HostHealth> {
        self.hosts.read().await.get(host).cloned()
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let hosts = self.hosts.read().await.clone();
        let status = HealthResponse::compute_status(&components, &hosts);
        HealthResponse {
            status,
            components,
            hosts,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Primary monitor not started".to_string()),
            }
        } else if !health.status.is_operational() {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_is_healthy_but_not_ready() {
        let health = FleetHealth::new();
        let report = health.health().await;

        assert_eq!(report.status, ComponentStatus::Healthy);
        assert!(report.components.is_empty());
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unreachable_host_degrades() {
        let health = FleetHealth::new();
        health.register(components::DISPATCH).await;
        health.record_host("h1", "start", None).await;
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);

        health
            .record_host("h2", "start", Some("connection refused".into()))
            .await;
        let report = health.health().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert!(!report.hosts["h2"].reachable);

        health.record_host("h2", "stop", None).await;
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_component_wins() {
        let health = FleetHealth::new();
        health.register(components::PIPELINE).await;
        health.set_degraded(components::RECORDERS, "wavefront down").await;
        health.set_unhealthy(components::MONITOR, "sampler crashed").await;

        assert_eq!(health.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_follows_flag_and_health() {
        let health = FleetHealth::new();
        health.register(components::MONITOR).await;
        health.set_ready(true).await;
        assert!(health.readiness().await.ready);

        health.set_unhealthy(components::MONITOR, "down").await;
        let readiness = health.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }
}
