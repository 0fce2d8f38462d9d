//! In-process fleet of fake agents for tests

use crate::error::PodiumError;
use crate::models::{encode_records, LatencyMethod, TrafficRecord, TrafficRule};
use crate::pipeline::TrafficFilter;
use crate::rpc::{AgentConnector, AgentSession, HostProvisioner};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One agent call as seen by the fleet
#[derive(Debug, Clone)]
pub struct Call {
    pub host: String,
    pub op: &'static str,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Default)]
struct HostState {
    reachable: bool,
    delay: Duration,
    interfaces: HashMap<String, Vec<String>>,
    namespace_ips: Vec<String>,
    registered: Vec<TrafficRule>,
    started: Vec<String>,
    stopped: Vec<String>,
    records: Vec<TrafficRecord>,
    latency: Option<f64>,
    filters: Vec<TrafficFilter>,
    monitor_running: bool,
    params: HashMap<String, String>,
    pcaps: Vec<String>,
    prepped: bool,
    cleaned: bool,
}

#[derive(Default)]
struct FleetState {
    hosts: HashMap<String, HostState>,
    calls: Vec<Call>,
}

/// Fake agents keyed by host; clones share state
#[derive(Clone, Default)]
pub struct FakeFleet {
    state: Arc<Mutex<FleetState>>,
}

impl FakeFleet {
    /// Every host starts reachable with a running monitor and no interfaces
    pub fn new<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Self {
        let fleet = Self::default();
        {
            let mut state = fleet.state.lock().unwrap();
            for host in hosts {
                state.hosts.insert(
                    host.to_string(),
                    HostState {
                        reachable: true,
                        monitor_running: true,
                        ..Default::default()
                    },
                );
            }
        }
        fleet
    }

    fn with_host<R>(&self, host: &str, f: impl FnOnce(&mut HostState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(state.hosts.entry(host.to_string()).or_default())
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        self.with_host(host, |h| h.reachable = reachable);
    }

    /// Delay every call to `host`
    pub fn set_delay(&self, host: &str, delay: Duration) {
        self.with_host(host, |h| h.delay = delay);
    }

    pub fn set_interfaces<'a>(
        &self,
        host: &str,
        interfaces: impl IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    ) {
        let interfaces = interfaces
            .into_iter()
            .map(|(name, ips)| (name.to_string(), ips.into_iter().map(String::from).collect()))
            .collect();
        self.with_host(host, |h| h.interfaces = interfaces);
    }

    pub fn set_namespace_ips<'a>(&self, host: &str, ips: impl IntoIterator<Item = &'a str>) {
        let ips = ips.into_iter().map(String::from).collect();
        self.with_host(host, |h| h.namespace_ips = ips);
    }

    pub fn set_records(&self, host: &str, records: Vec<TrafficRecord>) {
        self.with_host(host, |h| h.records = records);
    }

    /// Scripted host-local latency aggregate
    pub fn set_latency(&self, host: &str, latency: Option<f64>) {
        self.with_host(host, |h| h.latency = latency);
    }

    pub fn set_monitor_running(&self, host: &str, running: bool) {
        self.with_host(host, |h| h.monitor_running = running);
    }

    pub fn monitor_running(&self, host: &str) -> bool {
        self.with_host(host, |h| h.monitor_running)
    }

    pub fn registered(&self, host: &str) -> Vec<TrafficRule> {
        self.with_host(host, |h| h.registered.clone())
    }

    pub fn started(&self, host: &str) -> Vec<String> {
        self.with_host(host, |h| h.started.clone())
    }

    pub fn stopped(&self, host: &str) -> Vec<String> {
        self.with_host(host, |h| h.stopped.clone())
    }

    pub fn filters(&self, host: &str) -> Vec<TrafficFilter> {
        self.with_host(host, |h| h.filters.clone())
    }

    pub fn param(&self, host: &str, name: &str) -> Option<String> {
        self.with_host(host, |h| h.params.get(name).cloned())
    }

    pub fn pcaps(&self, host: &str) -> Vec<String> {
        self.with_host(host, |h| h.pcaps.clone())
    }

    pub fn prepped(&self, host: &str) -> bool {
        self.with_host(host, |h| h.prepped)
    }

    pub fn cleaned(&self, host: &str) -> bool {
        self.with_host(host, |h| h.cleaned)
    }

    /// Completed calls named `op`, in completion order
    pub fn calls(&self, op: &str) -> Vec<Call> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentConnector for FakeFleet {
    async fn connect(&self, host: &str) -> Result<Box<dyn AgentSession>> {
        let reachable = self
            .state
            .lock()
            .unwrap()
            .hosts
            .get(host)
            .is_some_and(|h| h.reachable);
        if !reachable {
            return Err(PodiumError::unreachable(host, "connection refused").into());
        }
        Ok(Box::new(FakeSession {
            host: host.to_string(),
            fleet: self.clone(),
        }))
    }
}

#[async_trait]
impl HostProvisioner for FakeFleet {
    async fn prep_node(&self, host: &str, _username: &str, _password: &str) -> Result<()> {
        if !self.with_host(host, |h| h.reachable) {
            anyhow::bail!("ssh to {host} failed");
        }
        self.with_host(host, |h| h.prepped = true);
        Ok(())
    }

    async fn cleanup_node(
        &self,
        host: &str,
        _username: &str,
        _password: &str,
        _remove_db: bool,
    ) -> Result<()> {
        if !self.with_host(host, |h| h.reachable) {
            anyhow::bail!("ssh to {host} failed");
        }
        self.with_host(host, |h| h.cleaned = true);
        Ok(())
    }
}

struct FakeSession {
    host: String,
    fleet: FakeFleet,
}

impl FakeSession {
    async fn call<R>(&self, op: &'static str, f: impl FnOnce(&mut HostState) -> R) -> R {
        let started = Instant::now();
        let delay = self.fleet.with_host(&self.host, |h| h.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.fleet.with_host(&self.host, f);
        self.fleet.state.lock().unwrap().calls.push(Call {
            host: self.host.clone(),
            op,
            started,
            finished: Instant::now(),
        });
        result
    }
}

#[async_trait]
impl AgentSession for FakeSession {
    async fn interface_ips(&self) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.call("interface_ips", |h| h.interfaces.clone()).await)
    }

    async fn namespace_ips(&self) -> Result<Vec<String>> {
        Ok(self.call("namespace_ips", |h| h.namespace_ips.clone()).await)
    }

    async fn register_traffic(&self, rules: Vec<TrafficRule>) -> Result<()> {
        self.call("register_traffic", |h| h.registered.extend(rules))
            .await;
        Ok(())
    }

    async fn start_traffic(&self, ruleids: Vec<String>) -> Result<()> {
        self.call("start_traffic", |h| h.started.extend(ruleids)).await;
        Ok(())
    }

    async fn stop_traffic(&self, ruleids: Vec<String>) -> Result<()> {
        self.call("stop_traffic", |h| h.stopped.extend(ruleids)).await;
        Ok(())
    }

    async fn traffic_results(&self, reqid: &str, filter: &TrafficFilter) -> Result<Vec<u8>> {
        let records = self
            .call("traffic_results", |h| {
                h.filters.push(filter.clone());
                h.records
                    .iter()
                    .filter(|r| r.reqid == reqid && filter.matches(r))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        Ok(encode_records(&records)?)
    }

    async fn latency_stat(
        &self,
        _reqid: &str,
        _method: LatencyMethod,
        filter: &TrafficFilter,
    ) -> Result<Option<f64>> {
        Ok(self
            .call("latency_stat", |h| {
                h.filters.push(filter.clone());
                h.latency
            })
            .await)
    }

    async fn monitor_start(&self) -> Result<()> {
        self.call("monitor_start", |h| h.monitor_running = true).await;
        Ok(())
    }

    async fn monitor_stop(&self) -> Result<()> {
        self.call("monitor_stop", |h| h.monitor_running = false).await;
        Ok(())
    }

    async fn monitor_is_running(&self) -> Result<bool> {
        Ok(self.call("monitor_is_running", |h| h.monitor_running).await)
    }

    async fn get_param(&self, name: &str) -> Result<Option<String>> {
        Ok(self.call("get_param", |h| h.params.get(name).cloned()).await)
    }

    async fn set_param(&self, name: &str, value: &str) -> Result<()> {
        self.call("set_param", |h| {
            h.params.insert(name.to_string(), value.to_string())
        })
        .await;
        Ok(())
    }

    async fn start_pcap(&self, file_name: &str, _interface: &str, _args: &str) -> Result<()> {
        self.call("start_pcap", |h| h.pcaps.push(file_name.to_string()))
            .await;
        Ok(())
    }

    async fn stop_pcap(&self, file_name: &str) -> Result<()> {
        self.call("stop_pcap", |h| h.pcaps.retain(|f| f != file_name))
            .await;
        Ok(())
    }
}
