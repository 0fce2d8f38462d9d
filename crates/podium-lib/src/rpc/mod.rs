//! Contracts for talking to remote agents
//!
//! The coordinator only depends on [`AgentConnector`] and [`AgentSession`];
//! [`GrpcConnector`] is the production implementation.

mod grpc;
mod provision;

pub use grpc::{GrpcConnector, GrpcSession};
pub use provision::{HostProvisioner, NoopProvisioner};

pub use crate::models::LatencyMethod;

use crate::models::TrafficRule;
use crate::pipeline::TrafficFilter;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// One open session to an agent
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Interface name -> addresses owned by the agent host
    async fn interface_ips(&self) -> Result<HashMap<String, Vec<String>>>;

    /// Addresses living in network namespaces on the host
    async fn namespace_ips(&self) -> Result<Vec<String>>;

    async fn register_traffic(&self, rules: Vec<TrafficRule>) -> Result<()>;

    async fn start_traffic(&self, ruleids: Vec<String>) -> Result<()>;

    async fn stop_traffic(&self, ruleids: Vec<String>) -> Result<()>;

    /// Serialized records for `reqid` matching the filter
    async fn traffic_results(&self, reqid: &str, filter: &TrafficFilter) -> Result<Vec<u8>>;

    /// Host-local latency aggregate, `None` when nothing matched
    async fn latency_stat(
        &self,
        reqid: &str,
        method: LatencyMethod,
        filter: &TrafficFilter,
    ) -> Result<Option<f64>>;

    async fn monitor_start(&self) -> Result<()>;

    async fn monitor_stop(&self) -> Result<()>;

    async fn monitor_is_running(&self) -> Result<bool>;

    async fn get_param(&self, name: &str) -> Result<Option<String>>;

    async fn set_param(&self, name: &str, value: &str) -> Result<()>;

    async fn start_pcap(&self, file_name: &str, interface: &str, args: &str) -> Result<()>;

    async fn stop_pcap(&self, file_name: &str) -> Result<()>;

    /// Release the session. Dropping a session releases it as well.
    async fn close(&self) {}
}

/// Opens sessions to agents by host address
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn AgentSession>>;
}

pub type SharedConnector = Arc<dyn AgentConnector>;

/// Open a session to `host`, run `op` and close the session again
///
/// The session is closed whether `op` succeeds or fails.
pub async fn with_session<R, F, Fut>(connector: &dyn AgentConnector, host: &str, op: F) -> Result<R>
where
    F: FnOnce(Arc<dyn AgentSession>) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let session: Arc<dyn AgentSession> = Arc::from(connector.connect(host).await?);
    let result = op(Arc::clone(&session)).await;
    session.close().await;
    result
}
