//! Podium: the coordinator façade
//!
//! Owns the endpoint registry and the rule store, turns intents into rules,
//! drives registration, start and stop across the fleet and answers
//! result queries. Construct one explicitly and pass it where it is needed.

mod monitor;

pub use monitor::{MonitorStatus, PrimaryMonitor};

use crate::aggregator::{ResultAggregator, TrafficStats};
use crate::config::SharedConfig;
use crate::dispatch::{jobs, DispatchExecutor, RegistrationMode, RegistrationPlan};
use crate::error::{PodiumError, PodiumResult};
use crate::health::{components, FleetHealth};
use crate::models::{new_id, Protocol, RuleState, TrafficIntent, TrafficRecord, TrafficRule};
use crate::observability::StructuredLogger;
use crate::pipeline::TrafficFilter;
use crate::recorder::RecorderRegistry;
use crate::registry::EndpointRegistry;
use crate::rpc::{with_session, AgentConnector, HostProvisioner, NoopProvisioner, SharedConnector};
use crate::rules::RuleStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Polling period while waiting for an agent to come up
const HOST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a registration call achieved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    /// Rules stored locally under their reqids
    pub rules: usize,
    /// Rules whose source and destination hosts both acknowledged
    pub registered: usize,
    /// Intents dropped as invalid or unresolvable
    pub skipped: usize,
    /// Hosts that did not complete their registration call
    pub failed_hosts: Vec<String>,
}

pub struct PodiumBuilder {
    config: SharedConfig,
    connector: SharedConnector,
    provisioner: Arc<dyn HostProvisioner>,
    rules: Option<Arc<RuleStore>>,
    recorders: Option<Arc<RecorderRegistry>>,
    health: FleetHealth,
}

impl PodiumBuilder {
    pub fn provisioner(mut self, provisioner: Arc<dyn HostProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn rule_store(mut self, rules: Arc<RuleStore>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn recorders(mut self, recorders: Arc<RecorderRegistry>) -> Self {
        self.recorders = Some(recorders);
        self
    }

    pub fn health(mut self, health: FleetHealth) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> Podium {
        let registry = Arc::new(EndpointRegistry::new());
        let rules = self.rules.unwrap_or_default();
        let recorders = self
            .recorders
            .unwrap_or_else(|| Arc::new(RecorderRegistry::with_defaults(Arc::clone(&self.config))));
        let executor = DispatchExecutor::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
            self.health.clone(),
        );
        let aggregator = ResultAggregator::new(
            executor.clone(),
            Arc::clone(&self.config),
            Arc::clone(&rules),
            Arc::clone(&registry),
        );
        let monitor = PrimaryMonitor::new(Arc::clone(&self.config), recorders, self.health.clone());

        Podium {
            config: self.config,
            connector: self.connector,
            provisioner: self.provisioner,
            registry,
            rules,
            executor,
            aggregator,
            monitor,
            health: self.health,
            logger: StructuredLogger::new("podium"),
        }
    }
}

pub struct Podium {
    config: SharedConfig,
    connector: SharedConnector,
    provisioner: Arc<dyn HostProvisioner>,
    registry: Arc<EndpointRegistry>,
    rules: Arc<RuleStore>,
    executor: DispatchExecutor,
    aggregator: ResultAggregator,
    monitor: PrimaryMonitor,
    health: FleetHealth,
    logger: StructuredLogger,
}

impl Podium {
    pub fn builder(config: SharedConfig, connector: SharedConnector) -> PodiumBuilder {
        PodiumBuilder {
            config,
            connector,
            provisioner: Arc::new(NoopProvisioner),
            rules: None,
            recorders: None,
            health: FleetHealth::new(),
        }
    }

    pub fn new(config: SharedConfig, connector: SharedConnector) -> Self {
        Self::builder(config, connector).build()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn health(&self) -> &FleetHealth {
        &self.health
    }

    pub fn monitor(&self) -> &PrimaryMonitor {
        &self.monitor
    }

    // ---- hosts and endpoints ----

    /// Host that owns endpoint `ip`
    pub fn get_ep_host(&self, ip: &str) -> Option<String> {
        self.registry.resolve(ip)
    }

    /// Learn the endpoints of an already running agent
    ///
    /// Failures are logged; the return value is the number of new endpoints.
    pub async fn add_endpoints(&self, host: &str) -> usize {
        let settings = self.config.settings();
        match self
            .registry
            .register_host(self.connector.as_ref(), &settings, host)
            .await
        {
            Ok(added) => added,
            Err(e) => {
                error!(host = %host, error = %format!("{e:#}"), "Error in adding endpoints");
                self.health
                    .record_host(host, "add_endpoints", Some(e.to_string()))
                    .await;
                0
            }
        }
    }

    /// Provision, wait for and register every host in parallel
    ///
    /// Returns the number of endpoints added per host that completed.
    pub async fn add_hosts<S: AsRef<str>>(&self, hosts: &[S]) -> HashMap<String, usize> {
        let payloads = hosts.iter().map(|h| (h.as_ref().trim().to_string(), ()));
        let provisioner = Arc::clone(&self.provisioner);
        let connector = Arc::clone(&self.connector);
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);

        self.executor
            .run(jobs("add_host", payloads), move |host, ()| {
                let provisioner = Arc::clone(&provisioner);
                let connector = Arc::clone(&connector);
                let registry = Arc::clone(&registry);
                let settings = config.settings();
                async move {
                    provisioner
                        .prep_node(&host, &settings.endpoint_username, &settings.endpoint_password)
                        .await?;
                    if !wait_on_host(connector.as_ref(), &host, settings.service_wait_time()).await {
                        error!(host = %host, "Could not start service");
                    }
                    registry
                        .register_host(connector.as_ref(), &settings, &host)
                        .await
                }
            })
            .await
    }

    /// [`add_hosts`](Self::add_hosts) for a comma separated list
    pub async fn add_hosts_str(&self, hosts: &str) -> HashMap<String, usize> {
        let hosts: Vec<&str> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect();
        self.add_hosts(&hosts).await
    }

    /// Whether the agent on `host` answers
    pub async fn is_host_up(&self, host: &str) -> bool {
        is_host_up(self.connector.as_ref(), host).await
    }

    /// Poll `host` until its agent answers or `wait` (default
    /// `LYDIAN_SERVICE_WAIT_TIME`) runs out
    pub async fn wait_on_host(&self, host: &str, wait: Option<Duration>) -> bool {
        let wait = wait.unwrap_or_else(|| self.config.settings().service_wait_time());
        wait_on_host(self.connector.as_ref(), host, wait).await
    }

    /// Uninstall the agent from every host in parallel
    pub async fn stop_service<S: AsRef<str>>(&self, hosts: &[S], remove_db: bool) -> BTreeSet<String> {
        let payloads = hosts.iter().map(|h| (h.as_ref().to_string(), ()));
        let provisioner = Arc::clone(&self.provisioner);
        let config = Arc::clone(&self.config);

        self.executor
            .run(jobs("cleanup_node", payloads), move |host, ()| {
                let provisioner = Arc::clone(&provisioner);
                let settings = config.settings();
                async move {
                    provisioner
                        .cleanup_node(
                            &host,
                            &settings.endpoint_username,
                            &settings.endpoint_password,
                            remove_db,
                        )
                        .await
                }
            })
            .await
            .into_keys()
            .collect()
    }

    // ---- traffic ----

    /// Turn intents into rules and register them with the agents
    ///
    /// Each rule goes to its destination's host as a server and to its
    /// source's host as a client. With `TRAFFIC_START_SERVERS_FIRST` all
    /// server registrations complete before any client is contacted.
    pub async fn register_traffic(&self, intents: Vec<TrafficIntent>) -> RegistrationOutcome {
        let mut skipped = 0;
        let mut rules = Vec::with_capacity(intents.len());
        for intent in intents {
            match TrafficRule::from_intent(intent) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    error!(error = %e, "Skipping invalid intent");
                    skipped += 1;
                }
            }
        }

        let plan = RegistrationPlan::build(rules, &self.registry);
        skipped += plan.skipped.len();
        self.rules.add_rules(plan.rules.clone());

        let mode = RegistrationMode::from_settings(&self.config.settings());
        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut failed_hosts: BTreeSet<String> = BTreeSet::new();
        for phase in plan.phases(mode) {
            let requested: Vec<String> = phase.iter().map(|j| j.host.clone()).collect();
            let done = self
                .executor
                .run_sessions(phase, |session, rules: Vec<TrafficRule>| async move {
                    session.register_traffic(rules).await
                })
                .await;
            for host in requested {
                if done.contains_key(&host) {
                    completed.insert(host);
                } else {
                    failed_hosts.insert(host);
                }
            }
        }
        // A host acknowledged in one phase but failed in the other still failed
        completed.retain(|h| !failed_hosts.contains(h));

        let registered: Vec<&str> = plan
            .rules
            .iter()
            .filter(|rule| {
                let src = self.registry.resolve(&rule.src);
                let dst = self.registry.resolve(&rule.dst);
                src.is_some_and(|h| completed.contains(&h)) && dst.is_some_and(|h| completed.contains(&h))
            })
            .map(|rule| rule.ruleid.as_str())
            .collect();
        self.rules.set_state(registered.iter().copied(), RuleState::Registered);

        if let Some(reqid) = plan.rules.first().map(|r| r.reqid.as_str()) {
            self.logger.log_traffic_registered(
                reqid,
                plan.rules.len(),
                skipped,
                mode == RegistrationMode::Phased,
            );
        }
        if !failed_hosts.is_empty() {
            self.health
                .set_degraded(
                    components::DISPATCH,
                    format!("registration incomplete on {} hosts", failed_hosts.len()),
                )
                .await;
        }

        RegistrationOutcome {
            rules: plan.rules.len(),
            registered: registered.len(),
            skipped,
            failed_hosts: failed_hosts.into_iter().collect(),
        }
    }

    /// Register one probe from `src` to `dst`; returns its reqid
    ///
    /// With a non-zero `duration` the call waits that long and then stops
    /// the request.
    pub async fn run_traffic(
        &self,
        src: &str,
        dst: &str,
        port: u16,
        protocol: Protocol,
        connected: bool,
        duration: Option<Duration>,
    ) -> String {
        let intent = TrafficIntent::new(src, dst, port, protocol).connected(connected);
        let reqid = intent.reqid.clone();
        self.register_traffic(vec![intent]).await;
        self.stop_after(&reqid, duration).await;
        reqid
    }

    /// Register a probe for every ordered pair of `hosts` under one reqid
    pub async fn run_mesh_ping<S: AsRef<str>>(
        &self,
        hosts: &[S],
        port: u16,
        protocol: Protocol,
        connected: bool,
        duration: Option<Duration>,
    ) -> String {
        let reqid = new_id();
        let mut intents = Vec::new();
        for (i, src) in hosts.iter().enumerate() {
            for (j, dst) in hosts.iter().enumerate() {
                if i == j {
                    continue;
                }
                intents.push(
                    TrafficIntent::new(src.as_ref(), dst.as_ref(), port, protocol)
                        .with_reqid(reqid.clone())
                        .connected(connected),
                );
            }
        }
        self.register_traffic(intents).await;
        self.stop_after(&reqid, duration).await;
        reqid
    }

    async fn stop_after(&self, reqid: &str, duration: Option<Duration>) {
        if let Some(duration) = duration.filter(|d| !d.is_zero()) {
            tokio::time::sleep(duration).await;
            self.stop_traffic(reqid).await;
        }
    }

    pub fn get_rules_by_reqid(&self, reqid: &str) -> Vec<TrafficRule> {
        self.rules.by_reqid(reqid)
    }

    /// Start every rule of `reqid` on its source's host
    ///
    /// Returns the hosts that acknowledged.
    pub async fn start_traffic(&self, reqid: &str) -> BTreeSet<String> {
        self.traffic_op(reqid, "start_traffic", RuleState::Running).await
    }

    /// Stop every rule of `reqid` on its source's host
    pub async fn stop_traffic(&self, reqid: &str) -> BTreeSet<String> {
        self.traffic_op(reqid, "stop_traffic", RuleState::Stopped).await
    }

    async fn traffic_op(
        &self,
        reqid: &str,
        operation: &'static str,
        state: RuleState,
    ) -> BTreeSet<String> {
        let mut by_host: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rule in self.rules.by_reqid(reqid) {
            match self.registry.resolve(&rule.src) {
                Some(host) => by_host.entry(host).or_default().push(rule.ruleid),
                None => warn!(
                    error = %PodiumError::UnresolvedEndpoint(rule.src.clone()),
                    ruleid = %rule.ruleid,
                    "Skipping rule"
                ),
            }
        }

        let start = state == RuleState::Running;
        let done = self
            .executor
            .run_sessions(jobs(operation, by_host.clone()), move |session, ruleids: Vec<String>| async move {
                if start {
                    session.start_traffic(ruleids).await
                } else {
                    session.stop_traffic(ruleids).await
                }
            })
            .await;

        let acknowledged: BTreeSet<String> = done.into_keys().collect();
        let ruleids = by_host
            .iter()
            .filter(|(host, _)| acknowledged.contains(*host))
            .flat_map(|(_, ids)| ids.iter().map(String::as_str));
        self.rules.set_state(ruleids, state);
        info!(reqid = %reqid, operation = operation, hosts = acknowledged.len(), "Traffic operation done");
        acknowledged
    }

    // ---- results ----

    pub async fn get_results(
        &self,
        reqid: &str,
        duration: Option<Duration>,
        filter: TrafficFilter,
    ) -> Vec<TrafficRecord> {
        self.aggregator.get_results(reqid, duration, filter).await
    }

    pub async fn get_traffic_stats(&self, reqid: &str, duration: Option<Duration>) -> TrafficStats {
        self.aggregator.get_traffic_stats(reqid, duration).await
    }

    pub async fn get_traffic_pass_percent(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.aggregator.get_traffic_pass_percent(reqid, duration).await
    }

    pub async fn get_traffic_fail_percent(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.aggregator.get_traffic_fail_percent(reqid, duration).await
    }

    pub async fn get_latency(
        &self,
        reqid: &str,
        method: &str,
        duration: Option<Duration>,
        filter: TrafficFilter,
    ) -> f64 {
        self.aggregator
            .get_latency(reqid, method, duration, filter)
            .await
    }

    pub async fn get_avg_latency(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.get_latency(reqid, "avg", duration, TrafficFilter::default())
            .await
    }

    pub async fn get_min_latency(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.get_latency(reqid, "min", duration, TrafficFilter::default())
            .await
    }

    pub async fn get_max_latency(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.get_latency(reqid, "max", duration, TrafficFilter::default())
            .await
    }

    // ---- remote agent controls ----

    fn host_of(&self, endpoint: &str) -> PodiumResult<String> {
        self.registry.require(endpoint)
    }

    /// Read a parameter from the agent owning `endpoint`
    pub async fn get_param(&self, endpoint: &str, name: &str) -> Result<Option<String>> {
        let host = self.host_of(endpoint)?;
        let name = name.to_string();
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.get_param(&name).await
        })
        .await
    }

    /// Set a parameter on the agent owning `endpoint`
    pub async fn set_param(&self, endpoint: &str, name: &str, value: &str) -> Result<()> {
        let host = self.host_of(endpoint)?;
        let (name, value) = (name.to_string(), value.to_string());
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.set_param(&name, &value).await
        })
        .await
    }

    pub async fn start_resource_monitoring(&self, endpoint: &str) -> Result<()> {
        let host = self.host_of(endpoint)?;
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.monitor_start().await
        })
        .await
    }

    pub async fn stop_resource_monitoring(&self, endpoint: &str) -> Result<()> {
        let host = self.host_of(endpoint)?;
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.monitor_stop().await
        })
        .await
    }

    /// Start a packet capture into `file_name` on the host owning `endpoint`
    pub async fn start_pcap(
        &self,
        endpoint: &str,
        file_name: &str,
        interface: &str,
        args: &str,
    ) -> Result<()> {
        let host = self.host_of(endpoint)?;
        let (file_name, interface, args) =
            (file_name.to_string(), interface.to_string(), args.to_string());
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.start_pcap(&file_name, &interface, &args).await
        })
        .await
    }

    pub async fn stop_pcap(&self, endpoint: &str, file_name: &str) -> Result<()> {
        let host = self.host_of(endpoint)?;
        let file_name = file_name.to_string();
        with_session(self.connector.as_ref(), &host, |session| async move {
            session.stop_pcap(&file_name).await
        })
        .await
    }

    // ---- local monitoring ----

    /// Start this node's resource sampler and record manager
    pub async fn start_primary_monitor(&self) {
        self.monitor.start().await;
        info!("Primary monitor started");
    }

    pub async fn stop_primary_monitor(&self) {
        self.monitor.stop().await;
        info!("Primary monitor stopped");
    }
}

/// The agent is up when it answers the monitor query, whatever the answer
async fn is_host_up(connector: &dyn AgentConnector, host: &str) -> bool {
    with_session(connector, host, |session| async move {
        session.monitor_is_running().await
    })
    .await
    .is_ok()
}

async fn wait_on_host(connector: &dyn AgentConnector, host: &str, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if is_host_up(connector, host).await {
            return true;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            warn!(host = %host, wait_secs = wait.as_secs(), "Agent did not come up in time");
            return false;
        }
        tokio::time::sleep(HOST_POLL_INTERVAL.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests;
