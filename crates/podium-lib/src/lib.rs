//! Control plane library for distributed traffic verification
//!
//! This crate provides the core functionality for:
//! - Endpoint discovery and the endpoint-to-host registry
//! - Traffic rule registration, start and stop across agent hosts
//! - Fleet-wide result, pass-rate and latency queries
//! - Bounded record pipelines, periodic samplers and recorders
//! - Health checks and observability

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod podium;
pub mod proto;
pub mod recorder;
pub mod registry;
pub mod rpc;
pub mod rules;
pub mod sampler;

#[cfg(test)]
mod testing;

pub use aggregator::TrafficStats;
pub use config::{ConfigProvider, LiveConfig, PodiumSettings, SharedConfig, StaticConfig};
pub use error::{PodiumError, PodiumResult};
pub use health::{
    ComponentHealth, ComponentStatus, FleetHealth, HealthResponse, HostHealth, ReadinessResponse,
};
pub use models::*;
pub use observability::{PodiumMetrics, StructuredLogger};
pub use pipeline::TrafficFilter;
pub use podium::{MonitorStatus, Podium, PodiumBuilder, RegistrationOutcome};
pub use rpc::{AgentConnector, AgentSession, GrpcConnector, HostProvisioner, SharedConnector};
