//! Endpoint registry
//!
//! Maps every endpoint address to the agent host that owns it. Entries are
//! only ever added; an address keeps the first host that claimed it.

use crate::config::PodiumSettings;
use crate::error::PodiumError;
use crate::observability::PodiumMetrics;
use crate::rpc::{with_session, AgentConnector};
use anyhow::Result;
use dashmap::DashMap;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<String, String>,
    metrics: PodiumMetrics,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host owning `endpoint`, if any
    pub fn resolve(&self, endpoint: &str) -> Option<String> {
        self.endpoints.get(endpoint).map(|host| host.value().clone())
    }

    /// Like [`resolve`](Self::resolve) but as an error for callers that skip
    pub fn require(&self, endpoint: &str) -> Result<String, PodiumError> {
        self.resolve(endpoint)
            .ok_or_else(|| PodiumError::UnresolvedEndpoint(endpoint.to_string()))
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.endpoints.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Add `endpoint -> host` unless the endpoint is already known
    ///
    /// Returns whether the entry was added.
    pub fn insert(&self, endpoint: &str, host: &str) -> bool {
        let mut added = false;
        let entry = self.endpoints.entry(endpoint.to_string()).or_insert_with(|| {
            added = true;
            host.to_string()
        });
        if !added && entry.value() != host {
            warn!(
                endpoint = %endpoint,
                owner = %entry.value(),
                claimed_by = %host,
                "Endpoint already owned by another host, keeping first owner"
            );
        }
        drop(entry);
        if added {
            self.metrics.set_endpoints_registered(self.endpoints.len());
        }
        added
    }

    /// Ask the agent on `host` for its addresses and record them
    ///
    /// Interfaces whose names do not start with a configured prefix are
    /// ignored; namespace addresses are always taken. The host address maps
    /// to itself. A host already registered is left alone.
    pub async fn register_host(
        &self,
        connector: &dyn AgentConnector,
        settings: &PodiumSettings,
        host: &str,
    ) -> Result<usize> {
        if self.contains(host) {
            info!(host = %host, "Host is already added");
            return Ok(0);
        }

        let addresses = with_session(connector, host, |session| async move {
            let mut addresses = Vec::new();
            for (iface, ips) in session.interface_ips().await? {
                if !settings.is_endpoint_interface(&iface) {
                    debug!(host = %host, interface = %iface, "Skipping interface");
                    continue;
                }
                addresses.extend(ips);
            }
            addresses.extend(session.namespace_ips().await?);
            Ok(addresses)
        })
        .await?;

        let mut added = 0;
        for ip in addresses.iter().map(String::as_str).chain(std::iter::once(host)) {
            if self.insert(ip, host) {
                added += 1;
            }
        }
        info!(host = %host, endpoints = added, "Endpoints added");
        Ok(added)
    }
}
