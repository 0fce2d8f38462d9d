//! Pluggable sinks that receive every drained record
//!
//! Recorders decide for themselves whether they are enabled, from live
//! configuration, on every record. Publishing is best effort: a failing or
//! slow recorder is logged and counted, never propagated.

mod telemetry;

pub use telemetry::{
    HttpPointSender, Point, PointSender, WavefrontResourceRecorder, WavefrontTrafficRecorder,
};

use crate::config::SharedConfig;
use crate::models::Record;
use crate::observability::PodiumMetrics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single recorder write
pub const RECORDER_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Recorder: Send + Sync {
    fn name(&self) -> &str;

    /// Re-evaluated on every record
    fn enabled(&self) -> bool;

    async fn write(&self, record: &Record) -> Result<()>;

    /// Push out anything batched; called when the pipeline goes idle
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Set of subscribed recorders
pub struct RecorderRegistry {
    recorders: RwLock<Vec<Arc<dyn Recorder>>>,
    write_timeout: Duration,
    metrics: PodiumMetrics,
}

impl Default for RecorderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderRegistry {
    pub fn new() -> Self {
        Self::with_timeout(RECORDER_WRITE_TIMEOUT)
    }

    pub fn with_timeout(write_timeout: Duration) -> Self {
        Self {
            recorders: RwLock::new(Vec::new()),
            write_timeout,
            metrics: PodiumMetrics::new(),
        }
    }

    /// Registry with the Wavefront traffic and resource recorders subscribed
    pub fn with_defaults(config: SharedConfig) -> Self {
        let registry = Self::new();
        let sender: Arc<dyn PointSender> = Arc::new(HttpPointSender::new(Arc::clone(&config)));
        registry.subscribe(Arc::new(WavefrontTrafficRecorder::new(
            Arc::clone(&config),
            Arc::clone(&sender),
        )));
        registry.subscribe(Arc::new(WavefrontResourceRecorder::new(config, sender)));
        registry
    }

    pub fn subscribe(&self, recorder: Arc<dyn Recorder>) {
        if let Ok(mut recorders) = self.recorders.write() {
            debug!(recorder = %recorder.name(), "Recorder subscribed");
            recorders.push(recorder);
        }
    }

    pub fn len(&self) -> usize {
        self.recorders.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Recorder>> {
        self.recorders
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Hand `record` to every enabled recorder
    ///
    /// Returns how many recorders accepted it.
    pub async fn publish(&self, record: &Record) -> usize {
        let mut accepted = 0;
        for recorder in self.snapshot() {
            if !recorder.enabled() {
                continue;
            }
            match tokio::time::timeout(self.write_timeout, recorder.write(record)).await {
                Ok(Ok(())) => accepted += 1,
                Ok(Err(e)) => {
                    self.metrics.inc_recorder_errors(recorder.name());
                    warn!(recorder = %recorder.name(), error = %e, "Recorder write failed");
                }
                Err(_) => {
                    self.metrics.inc_recorder_errors(recorder.name());
                    warn!(
                        recorder = %recorder.name(),
                        timeout_ms = self.write_timeout.as_millis() as u64,
                        "Recorder write timed out"
                    );
                }
            }
        }
        accepted
    }

    /// Flush every enabled recorder
    pub async fn flush(&self) {
        for recorder in self.snapshot() {
            if !recorder.enabled() {
                continue;
            }
            match tokio::time::timeout(self.write_timeout, recorder.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.metrics.inc_recorder_errors(recorder.name());
                    warn!(recorder = %recorder.name(), error = %e, "Recorder flush failed");
                }
                Err(_) => {
                    self.metrics.inc_recorder_errors(recorder.name());
                    warn!(recorder = %recorder.name(), "Recorder flush timed out");
                }
            }
        }
    }
}
