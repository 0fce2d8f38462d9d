//! Wavefront exporters for traffic and resource records

use super::Recorder;
use crate::config::SharedConfig;
use crate::models::{Record, ResourceRecord, TrafficRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const TRAFFIC_PREFIX: &str = "lydian.traffic";
const RESOURCE_PREFIX: &str = "lydian.resources";

/// One metric sample in Wavefront terms
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub value: f64,
    /// Unix seconds, taken from the record rather than send time
    pub timestamp: i64,
    pub source: String,
    pub tags: BTreeMap<String, String>,
}

impl Point {
    /// Render in the Wavefront data format
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} source={}",
            self.name,
            self.value,
            self.timestamp,
            quote(&self.source)
        );
        for (key, value) in &self.tags {
            let _ = write!(line, " {}={}", key, quote(value));
        }
        line
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Transport for batches of points
#[async_trait]
pub trait PointSender: Send + Sync {
    async fn send(&self, points: &[Point]) -> Result<()>;
}

/// Direct ingestion over HTTP
pub struct HttpPointSender {
    config: SharedConfig,
    client: reqwest::Client,
}

impl HttpPointSender {
    pub fn new(config: SharedConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl PointSender for HttpPointSender {
    async fn send(&self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let settings = self.config.settings();
        if settings.wavefront_server.is_empty() {
            anyhow::bail!("WAVEFRONT_SERVER is not configured");
        }
        let url = format!(
            "{}/report?f=wavefront",
            settings.wavefront_server.trim_end_matches('/')
        );
        let body = points
            .iter()
            .map(Point::to_line)
            .collect::<Vec<_>>()
            .join("\n");

        self.client
            .post(&url)
            .bearer_auth(&settings.wavefront_token)
            .body(body)
            .send()
            .await
            .context("Failed to reach Wavefront")?
            .error_for_status()
            .context("Wavefront rejected points")?;

        debug!(points = points.len(), "Sent points to Wavefront");
        Ok(())
    }
}

/// Points waiting for a full batch
struct Batch {
    sender: Arc<dyn PointSender>,
    pending: Mutex<Vec<Point>>,
}

impl Batch {
    fn new(sender: Arc<dyn PointSender>) -> Self {
        Self {
            sender,
            pending: Mutex::new(Vec::new()),
        }
    }

    async fn push(&self, points: Vec<Point>, batch_size: usize) -> Result<()> {
        let ready = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| anyhow::anyhow!("batch lock poisoned"))?;
            pending.extend(points);
            if pending.len() >= batch_size.max(1) {
                std::mem::take(&mut *pending)
            } else {
                Vec::new()
            }
        };
        self.sender.send(&ready).await
    }

    async fn flush(&self) -> Result<()> {
        let ready = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| anyhow::anyhow!("batch lock poisoned"))?;
            std::mem::take(&mut *pending)
        };
        self.sender.send(&ready).await
    }
}

/// Exports `lydian.traffic.<protocol>.result` and `.latency`
pub struct WavefrontTrafficRecorder {
    config: SharedConfig,
    batch: Batch,
}

impl WavefrontTrafficRecorder {
    pub fn new(config: SharedConfig, sender: Arc<dyn PointSender>) -> Self {
        Self {
            config,
            batch: Batch::new(sender),
        }
    }

    fn points(&self, record: &TrafficRecord) -> Vec<Point> {
        let settings = self.config.settings();
        let prefix = format!(
            "{TRAFFIC_PREFIX}.{}",
            record.protocol.as_str().to_ascii_lowercase()
        );
        let tags: BTreeMap<String, String> = [
            ("datacenter", settings.testbed_name.as_str()),
            ("test_id", settings.test_id.as_str()),
            ("reqid", record.reqid.as_str()),
            ("ruleid", record.ruleid.as_str()),
            ("source", record.source.as_str()),
            ("destination", record.destination.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        vec![
            Point {
                name: format!("{prefix}.result"),
                value: if record.result { 1.0 } else { 0.0 },
                timestamp: record.timestamp,
                source: settings.wavefront_source_tag.clone(),
                tags: tags.clone(),
            },
            Point {
                name: format!("{prefix}.latency"),
                value: record.latency,
                timestamp: record.timestamp,
                source: settings.wavefront_source_tag,
                tags,
            },
        ]
    }
}

#[async_trait]
impl Recorder for WavefrontTrafficRecorder {
    fn name(&self) -> &str {
        "wavefront_traffic"
    }

    fn enabled(&self) -> bool {
        self.config.settings().wavefront_traffic_recording
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let Record::Traffic(traffic) = record else {
            return Ok(());
        };
        if !self.enabled() {
            return Ok(());
        }
        let batch_size = self.config.settings().wavefront_batch_size;
        self.batch.push(self.points(traffic), batch_size).await
    }

    async fn flush(&self) -> Result<()> {
        self.batch.flush().await
    }
}

/// Exports `lydian.resources.<field>` per sampled field
pub struct WavefrontResourceRecorder {
    config: SharedConfig,
    batch: Batch,
}

impl WavefrontResourceRecorder {
    pub fn new(config: SharedConfig, sender: Arc<dyn PointSender>) -> Self {
        Self {
            config,
            batch: Batch::new(sender),
        }
    }

    fn points(&self, record: &ResourceRecord) -> Vec<Point> {
        let settings = self.config.settings();
        let tags: BTreeMap<String, String> = [
            ("datacenter".to_string(), settings.testbed_name.clone()),
            ("test_id".to_string(), settings.test_id.clone()),
        ]
        .into_iter()
        .collect();

        record
            .fields()
            .into_iter()
            .map(|(field, value)| Point {
                name: format!("{RESOURCE_PREFIX}.{field}"),
                value,
                timestamp: record.timestamp,
                source: settings.wavefront_source_tag.clone(),
                tags: tags.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Recorder for WavefrontResourceRecorder {
    fn name(&self) -> &str {
        "wavefront_resource"
    }

    fn enabled(&self) -> bool {
        self.config.settings().wavefront_resource_recording
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let Record::Resource(resource) = record else {
            return Ok(());
        };
        if !self.enabled() {
            return Ok(());
        }
        let batch_size = self.config.settings().wavefront_batch_size;
        self.batch.push(self.points(resource), batch_size).await
    }

    async fn flush(&self) -> Result<()> {
        self.batch.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PodiumSettings, StaticConfig};
    use crate::models::Protocol;

    #[derive(Default)]
    struct CapturingSender {
        batches: Mutex<Vec<Vec<Point>>>,
    }

    #[async_trait]
    impl PointSender for CapturingSender {
        async fn send(&self, points: &[Point]) -> Result<()> {
            if !points.is_empty() {
                self.batches.lock().unwrap().push(points.to_vec());
            }
            Ok(())
        }
    }

    fn config(batch_size: usize) -> SharedConfig {
        Arc::new(StaticConfig(PodiumSettings {
            wavefront_traffic_recording: true,
            wavefront_resource_recording: true,
            wavefront_batch_size: batch_size,
            wavefront_source_tag: "podium".to_string(),
            testbed_name: "lab1".to_string(),
            test_id: "run-7".to_string(),
            ..Default::default()
        }))
    }

    fn traffic(result: bool) -> Record {
        Record::Traffic(TrafficRecord {
            source: "10.0.0.1".to_string(),
            destination: "10.0.0.2".to_string(),
            protocol: Protocol::Tcp,
            port: 80,
            result,
            reqid: "req".to_string(),
            ruleid: "rule".to_string(),
            latency: 1.5,
            timestamp: 1_600_000_000,
        })
    }

    #[tokio::test]
    async fn test_traffic_points_use_record_timestamp() {
        let sender = Arc::new(CapturingSender::default());
        let recorder = WavefrontTrafficRecorder::new(config(2), sender.clone());

        recorder.write(&traffic(false)).await.unwrap();

        let batches = sender.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["lydian.traffic.tcp.result", "lydian.traffic.tcp.latency"]);
        assert_eq!(batches[0][0].value, 0.0);
        assert_eq!(batches[0][1].value, 1.5);
        assert!(batches[0].iter().all(|p| p.timestamp == 1_600_000_000));
        assert_eq!(batches[0][0].tags["datacenter"], "lab1");
        assert_eq!(batches[0][0].tags["test_id"], "run-7");
    }

    #[tokio::test]
    async fn test_batches_until_size_then_flush() {
        let sender = Arc::new(CapturingSender::default());
        let recorder = WavefrontResourceRecorder::new(config(5), sender.clone());
        let sample = Record::Resource(ResourceRecord {
            cpu_percent: 10.0,
            memory_percent: 20.0,
            timestamp: 5,
        });

        recorder.write(&sample).await.unwrap();
        recorder.write(&sample).await.unwrap();
        assert!(sender.batches.lock().unwrap().is_empty());

        recorder.write(&sample).await.unwrap();
        assert_eq!(sender.batches.lock().unwrap()[0].len(), 6);

        recorder.write(&sample).await.unwrap();
        recorder.flush().await.unwrap();
        let batches = sender.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1][0].name, "lydian.resources.cpu_percent");
    }

    #[tokio::test]
    async fn test_recorders_ignore_other_record_kinds() {
        let sender = Arc::new(CapturingSender::default());
        let recorder = WavefrontResourceRecorder::new(config(1), sender.clone());
        recorder.write(&traffic(true)).await.unwrap();
        recorder.flush().await.unwrap();
        assert!(sender.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_point_line_format() {
        let point = Point {
            name: "lydian.resources.cpu_percent".to_string(),
            value: 12.5,
            timestamp: 42,
            source: "podium".to_string(),
            tags: BTreeMap::from([("test_id".to_string(), "a\"b".to_string())]),
        };
        assert_eq!(
            point.to_line(),
            "lydian.resources.cpu_percent 12.5 42 source=\"podium\" test_id=\"a\\\"b\""
        );
    }
}
