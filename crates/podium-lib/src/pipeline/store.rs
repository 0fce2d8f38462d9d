//! Local record persistence and the filters agents apply to it

use crate::models::{encode_records, LatencyMethod, Protocol, ResourceRecord, TrafficRecord};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use tracing::info;

/// Field filters pushed down to an agent's record store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficFilter {
    pub result: Option<bool>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub protocol: Option<Protocol>,
    pub port: Option<u16>,
    pub ruleid: Option<String>,
    /// Inclusive `(since, until)` window in unix seconds
    pub timestamp: Option<(i64, i64)>,
}

impl TrafficFilter {
    pub fn with_result(mut self, result: bool) -> Self {
        self.result = Some(result);
        self
    }

    /// Build a filter from loosely typed `key=value` pairs
    ///
    /// Keys that are not record fields, and values that do not parse, are
    /// skipped with a log line.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let applied = match key {
                "result" => parse_bool(value).map(|v| filter.result = Some(v)),
                "source" => Some(filter.source = Some(value.to_string())),
                "destination" => Some(filter.destination = Some(value.to_string())),
                "protocol" => value.parse().ok().map(|p| filter.protocol = Some(p)),
                "port" => value.parse().ok().map(|p| filter.port = Some(p)),
                "ruleid" => Some(filter.ruleid = Some(value.to_string())),
                _ => None,
            };
            if applied.is_none() {
                info!(key = %key, value = %value, "Skipping invalid TrafficRecord filter");
            }
        }
        filter
    }

    pub fn matches(&self, record: &TrafficRecord) -> bool {
        self.result.map_or(true, |r| record.result == r)
            && self.source.as_deref().map_or(true, |s| record.source == s)
            && self
                .destination
                .as_deref()
                .map_or(true, |d| record.destination == d)
            && self.protocol.map_or(true, |p| record.protocol == p)
            && self.port.map_or(true, |p| record.port == p)
            && self.ruleid.as_deref().map_or(true, |r| record.ruleid == r)
            && self
                .timestamp
                .map_or(true, |(since, until)| {
                    record.timestamp >= since && record.timestamp <= until
                })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "pass" => Some(true),
        "0" | "false" | "fail" => Some(false),
        _ => None,
    }
}

/// Destination for drained records
pub trait RecordStore: Send + Sync {
    fn write_traffic(&self, record: &TrafficRecord) -> Result<()>;

    fn write_resource(&self, record: &ResourceRecord) -> Result<()>;
}

/// In-memory record store with FIFO eviction past `max_records`
///
/// Answers the same queries an agent serves remotely, so it can back a
/// local results surface.
pub struct MemoryRecordStore {
    traffic: RwLock<VecDeque<TrafficRecord>>,
    resources: RwLock<VecDeque<ResourceRecord>>,
    max_records: usize,
}

impl MemoryRecordStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            traffic: RwLock::new(VecDeque::new()),
            resources: RwLock::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    /// Records for `reqid` matching `filter`, oldest first
    pub fn traffic(&self, reqid: &str, filter: &TrafficFilter) -> Vec<TrafficRecord> {
        match self.traffic.read() {
            Ok(records) => records
                .iter()
                .filter(|r| r.reqid == reqid && filter.matches(r))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Matching records in their wire encoding
    pub fn traffic_blob(&self, reqid: &str, filter: &TrafficFilter) -> Result<Vec<u8>> {
        Ok(encode_records(&self.traffic(reqid, filter))?)
    }

    /// Reduce the latency of matching records
    pub fn latency_stat(
        &self,
        reqid: &str,
        method: LatencyMethod,
        filter: &TrafficFilter,
    ) -> Option<f64> {
        let latencies: Vec<f64> = self
            .traffic(reqid, filter)
            .iter()
            .map(|r| r.latency)
            .collect();
        method.reduce(&latencies)
    }

    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.resources
            .read()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn traffic_len(&self) -> usize {
        self.traffic.read().map(|r| r.len()).unwrap_or_default()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_QUEUE_SIZE)
    }
}

impl RecordStore for MemoryRecordStore {
    fn write_traffic(&self, record: &TrafficRecord) -> Result<()> {
        let mut records = self
            .traffic
            .write()
            .map_err(|_| anyhow::anyhow!("traffic store lock poisoned"))?;
        while records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn write_resource(&self, record: &ResourceRecord) -> Result<()> {
        let mut records = self
            .resources
            .write()
            .map_err(|_| anyhow::anyhow!("resource store lock poisoned"))?;
        while records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decode_records;

    fn record(reqid: &str, result: bool, latency: f64, timestamp: i64) -> TrafficRecord {
        TrafficRecord {
            source: "10.0.0.1".to_string(),
            destination: "10.0.0.2".to_string(),
            protocol: Protocol::Tcp,
            port: 5000,
            result,
            reqid: reqid.to_string(),
            ruleid: "rule-1".to_string(),
            latency,
            timestamp,
        }
    }

    #[test]
    fn test_filter_from_pairs_skips_unknown_keys() {
        let filter = TrafficFilter::from_pairs([
            ("result", "1"),
            ("port", "5000"),
            ("colour", "red"),
            ("protocol", "udp"),
        ]);

        assert_eq!(filter.result, Some(true));
        assert_eq!(filter.port, Some(5000));
        assert_eq!(filter.protocol, Some(Protocol::Udp));
        assert!(filter.source.is_none());
    }

    #[test]
    fn test_filter_window_is_inclusive() {
        let filter = TrafficFilter {
            timestamp: Some((100, 200)),
            ..Default::default()
        };
        assert!(filter.matches(&record("r", true, 1.0, 100)));
        assert!(filter.matches(&record("r", true, 1.0, 200)));
        assert!(!filter.matches(&record("r", true, 1.0, 201)));
    }

    #[test]
    fn test_store_queries_by_reqid_and_result() {
        let store = MemoryRecordStore::new(100);
        store.write_traffic(&record("a", true, 5.0, 1)).unwrap();
        store.write_traffic(&record("a", false, 7.0, 2)).unwrap();
        store.write_traffic(&record("b", true, 9.0, 3)).unwrap();

        assert_eq!(store.traffic("a", &TrafficFilter::default()).len(), 2);
        let failed = store.traffic("a", &TrafficFilter::default().with_result(false));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].latency, 7.0);
    }

    #[test]
    fn test_store_latency_stat() {
        let store = MemoryRecordStore::new(100);
        for (i, latency) in [2.0, 4.0, 9.0].into_iter().enumerate() {
            store.write_traffic(&record("a", true, latency, i as i64)).unwrap();
        }

        let all = TrafficFilter::default();
        assert_eq!(store.latency_stat("a", LatencyMethod::Avg, &all), Some(5.0));
        assert_eq!(store.latency_stat("a", LatencyMethod::Min, &all), Some(2.0));
        assert_eq!(store.latency_stat("a", LatencyMethod::Max, &all), Some(9.0));
        assert_eq!(store.latency_stat("missing", LatencyMethod::Avg, &all), None);
    }

    #[test]
    fn test_store_evicts_oldest_past_capacity() {
        let store = MemoryRecordStore::new(2);
        for ts in 0..3 {
            store.write_traffic(&record("a", true, 1.0, ts)).unwrap();
        }
        let kept = store.traffic("a", &TrafficFilter::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].timestamp, 1);
    }

    #[test]
    fn test_traffic_blob_decodes() {
        let store = MemoryRecordStore::new(10);
        store.write_traffic(&record("a", true, 1.0, 1)).unwrap();
        let blob = store.traffic_blob("a", &TrafficFilter::default()).unwrap();
        assert_eq!(decode_records(&blob).unwrap().len(), 1);
    }
}
