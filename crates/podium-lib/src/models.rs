//! Core data models for the traffic control plane

use crate::error::{PodiumError, PodiumResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Probe interval used when an intent does not carry one (seconds)
pub const DEFAULT_PROBE_INTERVAL: f64 = 1.0;

/// Optional rule fields an intent may carry besides the fixed ones
pub const RULE_OPTION_FIELDS: &[&str] = &["payload", "interval", "tries"];

/// Transport protocol a probe runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PodiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "HTTP" => Ok(Protocol::Http),
            other => Err(PodiumError::InvalidRule(format!(
                "unsupported protocol {other}"
            ))),
        }
    }
}

/// Latency reduction applied on each agent and again across agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMethod {
    Avg,
    Min,
    Max,
}

impl LatencyMethod {
    /// Parse a method name; `None` for anything other than avg/min/max
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "avg" => Some(LatencyMethod::Avg),
            "min" => Some(LatencyMethod::Min),
            "max" => Some(LatencyMethod::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyMethod::Avg => "avg",
            LatencyMethod::Min => "min",
            LatencyMethod::Max => "max",
        }
    }

    /// Reduce values with this method; `None` for an empty input
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let reduced = match self {
            LatencyMethod::Avg => values.iter().sum::<f64>() / values.len() as f64,
            LatencyMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            LatencyMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(reduced)
    }
}

/// Transient description of a desired probe, consumed to build a rule
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficIntent {
    pub reqid: String,
    pub ruleid: String,
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Whether the probe is expected to succeed
    pub connected: bool,
    options: BTreeMap<String, Value>,
}

impl TrafficIntent {
    /// New intent with a fresh reqid and ruleid
    pub fn new(src: impl Into<String>, dst: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            reqid: new_id(),
            ruleid: new_id(),
            src: src.into(),
            dst: dst.into(),
            port,
            protocol,
            connected: true,
            options: BTreeMap::new(),
        }
    }

    /// Group this intent under an existing request id
    pub fn with_reqid(mut self, reqid: impl Into<String>) -> Self {
        self.reqid = reqid.into();
        self
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Attach an optional rule field. Names outside [`RULE_OPTION_FIELDS`]
    /// are dropped with a log line.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        if RULE_OPTION_FIELDS.contains(&name) {
            self.options.insert(name.to_string(), value.into());
        } else {
            warn!(field = %name, ruleid = %self.ruleid, "Dropping field not in rule schema");
        }
        self
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleOptions {
    payload: Option<String>,
    interval: Option<f64>,
    tries: Option<u32>,
}

/// Lifecycle of a rule as tracked by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    #[default]
    Created,
    Registered,
    Running,
    Stopped,
}

/// A durable directional probe definition between two endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRule {
    pub reqid: String,
    pub ruleid: String,
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: Protocol,
    pub connected: bool,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub interval: f64,
    #[serde(default)]
    pub tries: u32,
    #[serde(default)]
    pub state: RuleState,
}

impl TrafficRule {
    /// Build a rule from an intent, validating its optional fields
    pub fn from_intent(intent: TrafficIntent) -> PodiumResult<Self> {
        let options: RuleOptions = serde_json::from_value(Value::Object(
            intent.options.into_iter().collect::<Map<String, Value>>(),
        ))
        .map_err(|e| PodiumError::InvalidRule(format!("rule {}: {e}", intent.ruleid)))?;

        let mut rule = Self {
            reqid: intent.reqid,
            ruleid: intent.ruleid,
            src: intent.src,
            dst: intent.dst,
            port: intent.port,
            protocol: intent.protocol,
            connected: intent.connected,
            payload: options.payload.unwrap_or_default(),
            interval: options.interval.unwrap_or_default(),
            tries: options.tries.unwrap_or_default(),
            state: RuleState::Created,
        };
        rule.fill()?;
        Ok(rule)
    }

    /// Compute defaulted fields and reject rules that cannot run
    pub fn fill(&mut self) -> PodiumResult<()> {
        if self.ruleid.is_empty() || self.reqid.is_empty() {
            return Err(PodiumError::InvalidRule("missing reqid or ruleid".into()));
        }
        if self.src.is_empty() || self.dst.is_empty() {
            return Err(PodiumError::InvalidRule(format!(
                "rule {} needs both src and dst",
                self.ruleid
            )));
        }
        if self.port == 0 {
            return Err(PodiumError::InvalidRule(format!(
                "rule {} has port 0",
                self.ruleid
            )));
        }
        if self.payload.is_empty() {
            self.payload = format!("{}:{}", self.reqid, self.ruleid);
        }
        if self.interval <= 0.0 {
            self.interval = DEFAULT_PROBE_INTERVAL;
        }
        if self.tries == 0 {
            self.tries = 1;
        }
        Ok(())
    }
}

/// One probe outcome observed by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub source: String,
    pub destination: String,
    pub protocol: Protocol,
    pub port: u16,
    pub result: bool,
    pub reqid: String,
    pub ruleid: String,
    /// Round trip in milliseconds
    pub latency: f64,
    /// Unix seconds
    pub timestamp: i64,
}

/// Periodic host resource sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub timestamp: i64,
}

impl ResourceRecord {
    /// Named numeric fields, used by exporters that emit one series per field
    pub fn fields(&self) -> [(&'static str, f64); 2] {
        [
            ("cpu_percent", self.cpu_percent),
            ("memory_percent", self.memory_percent),
        ]
    }
}

/// Any record flowing through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Traffic(TrafficRecord),
    Resource(ResourceRecord),
}

impl From<TrafficRecord> for Record {
    fn from(r: TrafficRecord) -> Self {
        Record::Traffic(r)
    }
}

impl From<ResourceRecord> for Record {
    fn from(r: ResourceRecord) -> Self {
        Record::Resource(r)
    }
}

/// Decode the record blob returned by an agent's results query
pub fn decode_records(blob: &[u8]) -> PodiumResult<Vec<TrafficRecord>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(blob)?)
}

/// Encode records the way agents ship them back
pub fn encode_records(records: &[TrafficRecord]) -> PodiumResult<Vec<u8>> {
    Ok(serde_json::to_vec(records)?)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
