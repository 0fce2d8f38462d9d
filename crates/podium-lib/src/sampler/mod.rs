//! Background tasks that produce one record per interval
//!
//! A [`PeriodicSampler`] is either stopped or running. `start` and `stop`
//! are idempotent, and `stop` returns only once the task has exited.

mod sources;

pub use sources::{MockTrafficSource, ResourceSource};

use crate::config::SharedConfig;
use crate::pipeline::RecordSender;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval used when nothing else is configured
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(8);

/// Builds one record per sampling tick
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Record: Debug + Send + 'static;

    fn name(&self) -> &'static str;

    async fn sample(&self) -> Result<Self::Record>;
}

/// Where the sampler takes its sleep between ticks from
#[derive(Clone)]
pub enum SampleInterval {
    Fixed(Duration),
    /// `RESOURCE_MONITOR_INTERVAL`, read again every tick
    Live(SharedConfig),
}

impl SampleInterval {
    fn current(&self) -> Duration {
        match self {
            SampleInterval::Fixed(d) => *d,
            SampleInterval::Live(config) => config.settings().monitor_interval(),
        }
    }
}

impl Default for SampleInterval {
    fn default() -> Self {
        SampleInterval::Fixed(DEFAULT_SAMPLE_INTERVAL)
    }
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PeriodicSampler<S: RecordSource> {
    source: Arc<S>,
    sender: RecordSender<S::Record>,
    interval: SampleInterval,
    running: Mutex<Option<Running>>,
}

impl<S: RecordSource> PeriodicSampler<S> {
    pub fn new(source: S, sender: RecordSender<S::Record>, interval: SampleInterval) -> Self {
        Self {
            source: Arc::new(source),
            sender,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Launch the sampling loop unless it is already running
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            info!(sampler = self.source.name(), "Sampler already running");
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(sample_loop(
            Arc::clone(&self.source),
            self.sender.clone(),
            self.interval.clone(),
            stop_rx,
        ));
        *running = Some(Running { stop, handle });
        info!(sampler = self.source.name(), "Sampler started");
    }

    /// Signal the loop and wait until it has exited
    pub async fn stop(&self) {
        let Some(Running { stop, handle }) = self.running.lock().await.take() else {
            info!(sampler = self.source.name(), "Sampler is not running");
            return;
        };
        let _ = stop.send(true);
        if let Err(e) = handle.await {
            warn!(sampler = self.source.name(), error = %e, "Sampler task ended abnormally");
        }
        info!(sampler = self.source.name(), "Sampler stopped");
    }

    /// True only while the background task is alive
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn sample_loop<S: RecordSource>(
    source: Arc<S>,
    sender: RecordSender<S::Record>,
    interval: SampleInterval,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let stopped = *stop.borrow();
        if stopped {
            break;
        }

        match source.sample().await {
            // A full queue is logged by the sender; keep sampling
            Ok(record) => {
                if sender.offer(record).is_err() {
                    debug!(sampler = source.name(), "Sample dropped");
                }
            }
            Err(e) => warn!(sampler = source.name(), error = %e, "Failed to take sample"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval.current()) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
