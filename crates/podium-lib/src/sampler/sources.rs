use super::RecordSource;
use crate::models::{Protocol, ResourceRecord, TrafficRecord, TrafficRule};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use sysinfo::System;
use tracing::{error, info};

/// CPU and memory utilisation of the local host
pub struct ResourceSource {
    system: Mutex<System>,
}

impl Default for ResourceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

#[async_trait]
impl RecordSource for ResourceSource {
    type Record = ResourceRecord;

    fn name(&self) -> &'static str {
        "resource"
    }

    async fn sample(&self) -> Result<ResourceRecord> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow::anyhow!("system handle poisoned"))?;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let used = total.saturating_sub(system.available_memory());
        let memory_percent = if total > 0 {
            used as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        Ok(ResourceRecord {
            cpu_percent: f64::from(system.global_cpu_info().cpu_usage()),
            memory_percent,
            timestamp: chrono::Utc::now().timestamp(),
        })
    }
}

/// Placeholder traffic generator for exercising the pipeline without a
/// probe engine
///
/// Emits one successful record per tick, cycling through registered rules,
/// or an all-zero record when none are registered.
#[derive(Default)]
pub struct MockTrafficSource {
    rules: Mutex<BTreeMap<String, TrafficRule>>,
    cursor: Mutex<usize>,
}

impl MockTrafficSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_traffic(&self, rules: Vec<TrafficRule>) {
        let Ok(mut known) = self.rules.lock() else {
            error!("Mock rule table poisoned");
            return;
        };
        for rule in rules {
            info!(ruleid = %rule.ruleid, "Registered mock traffic");
            known.insert(rule.ruleid.clone(), rule);
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_rule(&self) -> Option<TrafficRule> {
        let rules = self.rules.lock().ok()?;
        if rules.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock().ok()?;
        let rule = rules.values().nth(*cursor % rules.len()).cloned();
        *cursor = cursor.wrapping_add(1);
        rule
    }
}

#[async_trait]
impl RecordSource for MockTrafficSource {
    type Record = TrafficRecord;

    fn name(&self) -> &'static str {
        "mock_traffic"
    }

    async fn sample(&self) -> Result<TrafficRecord> {
        let timestamp = chrono::Utc::now().timestamp();
        let record = match self.next_rule() {
            Some(rule) => TrafficRecord {
                source: rule.src,
                destination: rule.dst,
                protocol: rule.protocol,
                port: rule.port,
                result: true,
                reqid: rule.reqid,
                ruleid: rule.ruleid,
                latency: 0.0,
                timestamp,
            },
            None => TrafficRecord {
                source: "0.0.0.0".to_string(),
                destination: "0.0.0.0".to_string(),
                protocol: Protocol::Tcp,
                port: 0,
                result: true,
                reqid: "0000-00000-0000".to_string(),
                ruleid: "0000-00000-0000".to_string(),
                latency: 0.0,
                timestamp,
            },
        };
        Ok(record)
    }
}
