//! gRPC implementation of the agent contracts

use super::{AgentConnector, AgentSession, LatencyMethod};
use crate::config::SharedConfig;
use crate::models::TrafficRule;
use crate::pipeline::TrafficFilter;
use crate::proto::{self, AgentServiceClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Connects to agents over gRPC on the configured agent port
pub struct GrpcConnector {
    config: SharedConfig,
}

impl GrpcConnector {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentConnector for GrpcConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn AgentSession>> {
        let settings = self.config.settings();
        let uri = agent_uri(host, settings.agent_rpc_port)?;

        let channel = Endpoint::from_shared(uri.clone())
            .with_context(|| format!("Invalid agent endpoint {uri}"))?
            .connect_timeout(settings.rpc_timeout())
            .timeout(settings.rpc_timeout())
            .connect()
            .await
            .with_context(|| format!("Failed to connect to agent at {uri}"))?;

        debug!(host = %host, "Opened agent session");
        Ok(Box::new(GrpcSession {
            host: host.to_string(),
            client: AgentServiceClient::new(channel),
        }))
    }
}

/// One gRPC channel to an agent; dropping it closes the connection
pub struct GrpcSession {
    host: String,
    client: AgentServiceClient<Channel>,
}

impl GrpcSession {
    fn client(&self) -> AgentServiceClient<Channel> {
        self.client.clone()
    }
}

#[async_trait]
impl AgentSession for GrpcSession {
    async fn interface_ips(&self) -> Result<HashMap<String, Vec<String>>> {
        let response = self
            .client()
            .get_interface_ips_map(proto::Empty {})
            .await
            .context("interfaces.getInterfaceIPsMap failed")?;
        Ok(response
            .into_inner()
            .interfaces
            .into_iter()
            .map(|(name, list)| (name, list.ips))
            .collect())
    }

    async fn namespace_ips(&self) -> Result<Vec<String>> {
        let response = self
            .client()
            .list_namespace_ips(proto::Empty {})
            .await
            .context("namespaces.listNamespaceIPs failed")?;
        Ok(response.into_inner().ips)
    }

    async fn register_traffic(&self, rules: Vec<TrafficRule>) -> Result<()> {
        let request = proto::RegisterTrafficRequest {
            rules: rules.iter().map(convert_rule).collect(),
        };
        self.client()
            .register_traffic(request)
            .await
            .context("controller.registerTraffic failed")?;
        Ok(())
    }

    async fn start_traffic(&self, ruleids: Vec<String>) -> Result<()> {
        self.client()
            .start(proto::RuleIdsRequest { ruleids })
            .await
            .context("controller.start failed")?;
        Ok(())
    }

    async fn stop_traffic(&self, ruleids: Vec<String>) -> Result<()> {
        self.client()
            .stop(proto::RuleIdsRequest { ruleids })
            .await
            .context("controller.stop failed")?;
        Ok(())
    }

    async fn traffic_results(&self, reqid: &str, filter: &TrafficFilter) -> Result<Vec<u8>> {
        let request = proto::TrafficQuery {
            reqid: reqid.to_string(),
            filter: Some(convert_filter(filter)),
        };
        let response = self
            .client()
            .traffic(request)
            .await
            .context("results.traffic failed")?;
        Ok(response.into_inner().records)
    }

    async fn latency_stat(
        &self,
        reqid: &str,
        method: LatencyMethod,
        filter: &TrafficFilter,
    ) -> Result<Option<f64>> {
        let request = proto::LatencyQuery {
            reqid: reqid.to_string(),
            method: method.as_str().to_string(),
            filter: Some(convert_filter(filter)),
        };
        let response = self
            .client()
            .get_latency_stat(request)
            .await
            .context("results.getLatencyStat failed")?;
        Ok(response.into_inner().latency)
    }

    async fn monitor_start(&self) -> Result<()> {
        self.client()
            .monitor_start(proto::Empty {})
            .await
            .context("monitor.start failed")?;
        Ok(())
    }

    async fn monitor_stop(&self) -> Result<()> {
        self.client()
            .monitor_stop(proto::Empty {})
            .await
            .context("monitor.stop failed")?;
        Ok(())
    }

    async fn monitor_is_running(&self) -> Result<bool> {
        let response = self
            .client()
            .monitor_is_running(proto::Empty {})
            .await
            .context("monitor.isRunning failed")?;
        Ok(response.into_inner().running)
    }

    async fn get_param(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .client()
            .get_param(proto::ParamRequest {
                name: name.to_string(),
            })
            .await
            .context("configs.getParam failed")?;
        Ok(response.into_inner().value)
    }

    async fn set_param(&self, name: &str, value: &str) -> Result<()> {
        self.client()
            .set_param(proto::SetParamRequest {
                name: name.to_string(),
                value: value.to_string(),
            })
            .await
            .context("configs.setParam failed")?;
        Ok(())
    }

    async fn start_pcap(&self, file_name: &str, interface: &str, args: &str) -> Result<()> {
        self.client()
            .start_pcap(proto::PcapRequest {
                file_name: file_name.to_string(),
                interface: interface.to_string(),
                args: args.to_string(),
            })
            .await
            .context("pcap.start failed")?;
        Ok(())
    }

    async fn stop_pcap(&self, file_name: &str) -> Result<()> {
        self.client()
            .stop_pcap(proto::PcapRequest {
                file_name: file_name.to_string(),
                ..Default::default()
            })
            .await
            .context("pcap.stop failed")?;
        Ok(())
    }

    async fn close(&self) {
        debug!(host = %self.host, "Closing agent session");
    }
}

/// Build the agent URI, bracketing bare IPv6 addresses
fn agent_uri(host: &str, port: u16) -> Result<String> {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let url = url::Url::parse(&format!("http://{host}:{port}"))
        .with_context(|| format!("Invalid agent host {host}"))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn convert_rule(rule: &TrafficRule) -> proto::Rule {
    proto::Rule {
        reqid: rule.reqid.clone(),
        ruleid: rule.ruleid.clone(),
        src: rule.src.clone(),
        dst: rule.dst.clone(),
        port: u32::from(rule.port),
        protocol: rule.protocol.as_str().to_string(),
        connected: rule.connected,
        payload: rule.payload.clone(),
        interval: rule.interval,
        tries: rule.tries,
    }
}

fn convert_filter(filter: &TrafficFilter) -> proto::TrafficFilter {
    proto::TrafficFilter {
        result: filter.result,
        source: filter.source.clone(),
        destination: filter.destination.clone(),
        protocol: filter.protocol.map(|p| p.as_str().to_string()),
        port: filter.port.map(u32::from),
        ruleid: filter.ruleid.clone(),
        since: filter.timestamp.map(|(since, _)| since),
        until: filter.timestamp.map(|(_, until)| until),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Protocol, TrafficIntent};

    #[test]
    fn test_agent_uri() {
        assert_eq!(agent_uri("10.0.0.1", 5649).unwrap(), "http://10.0.0.1:5649");
        assert_eq!(agent_uri("fe80::1", 5649).unwrap(), "http://[fe80::1]:5649");
        assert!(agent_uri("bad host", 5649).is_err());
    }

    #[test]
    fn test_convert_rule() {
        let intent = TrafficIntent::new("10.0.0.1", "10.0.0.2", 8080, Protocol::Tcp);
        let rule = TrafficRule::from_intent(intent).unwrap();
        let wire = convert_rule(&rule);

        assert_eq!(wire.ruleid, rule.ruleid);
        assert_eq!(wire.port, 8080);
        assert_eq!(wire.protocol, "TCP");
        assert_eq!(wire.tries, 1);
    }

    #[test]
    fn test_convert_filter_splits_window() {
        let filter = TrafficFilter {
            result: Some(false),
            timestamp: Some((100, 200)),
            ..Default::default()
        };
        let wire = convert_filter(&filter);
        assert_eq!(wire.result, Some(false));
        assert_eq!(wire.since, Some(100));
        assert_eq!(wire.until, Some(200));
        assert!(wire.source.is_none());
    }
}
