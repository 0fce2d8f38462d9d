//! Drain loop behind the record queues

use super::{PipelineReceivers, RecordStore, RESOURCE_QUEUE, TRAFFIC_QUEUE};
use crate::models::{Record, ResourceRecord, TrafficRecord};
use crate::observability::PodiumMetrics;
use crate::recorder::RecorderRegistry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long one drain pass waits for either queue before flushing recorders
pub const DRAIN_WAIT: Duration = Duration::from_millis(100);

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<PipelineReceivers>,
}

/// Drains both queues into the store and the recorders
///
/// The drain task owns the receivers while it runs and hands them back when
/// it stops, so the manager can be started again.
pub struct RecordManager {
    store: Arc<dyn RecordStore>,
    recorders: Arc<RecorderRegistry>,
    idle: Mutex<Option<PipelineReceivers>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl RecordManager {
    pub fn new(
        receivers: PipelineReceivers,
        store: Arc<dyn RecordStore>,
        recorders: Arc<RecorderRegistry>,
    ) -> Self {
        Self {
            store,
            recorders,
            idle: Mutex::new(Some(receivers)),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Launch the drain task; a no-op while it is already running
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            info!("Record manager already running");
            return;
        }
        let receivers = self.idle.lock().ok().and_then(|mut idle| idle.take());
        let Some(receivers) = receivers else {
            warn!("Record queues are not available, record manager not started");
            return;
        };

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(drain(
            receivers,
            Arc::clone(&self.store),
            Arc::clone(&self.recorders),
            stop_rx,
        ));
        *running = Some(Running { stop, handle });
        info!("Record manager started");
    }

    /// Signal the drain task, wait for it to finish and reclaim the queues
    pub async fn stop(&self) {
        let Some(Running { stop, handle }) = self.running.lock().await.take() else {
            info!("Record manager is not running");
            return;
        };
        let _ = stop.send(true);
        match handle.await {
            Ok(receivers) => {
                if let Ok(mut idle) = self.idle.lock() {
                    *idle = Some(receivers);
                }
                info!("Record manager stopped");
            }
            Err(e) => warn!(error = %e, "Record manager task ended abnormally"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

enum Next {
    Traffic(Option<TrafficRecord>),
    Resource(Option<ResourceRecord>),
    Closed,
}

async fn deliver(
    record: Record,
    store: &dyn RecordStore,
    recorders: &RecorderRegistry,
    metrics: &PodiumMetrics,
) {
    let persisted = match &record {
        Record::Traffic(traffic) => store.write_traffic(traffic),
        Record::Resource(resource) => store.write_resource(resource),
    };
    let queue = match &record {
        Record::Traffic(_) => TRAFFIC_QUEUE,
        Record::Resource(_) => RESOURCE_QUEUE,
    };
    if let Err(e) = persisted {
        warn!(error = %e, queue = queue, "Failed to persist record");
    }
    recorders.publish(&record).await;
    metrics.inc_drained(queue);
}

async fn drain(
    mut receivers: PipelineReceivers,
    store: Arc<dyn RecordStore>,
    recorders: Arc<RecorderRegistry>,
    stop: watch::Receiver<bool>,
) -> PipelineReceivers {
    let metrics = PodiumMetrics::new();
    let mut traffic_open = true;
    let mut resource_open = true;
    let mut dirty = false;

    loop {
        let stopped = *stop.borrow();
        if stopped || !(traffic_open || resource_open) {
            break;
        }

        // One bounded wait covers both queues; whichever is ready is taken
        let next = tokio::time::timeout(DRAIN_WAIT, async {
            tokio::select! {
                record = receivers.traffic.recv(), if traffic_open => Next::Traffic(record),
                record = receivers.resource.recv(), if resource_open => Next::Resource(record),
                else => Next::Closed,
            }
        })
        .await;

        match next {
            Ok(Next::Traffic(Some(record))) => {
                deliver(Record::Traffic(record), store.as_ref(), &recorders, &metrics).await;
                dirty = true;
            }
            Ok(Next::Resource(Some(record))) => {
                deliver(Record::Resource(record), store.as_ref(), &recorders, &metrics).await;
                dirty = true;
            }
            Ok(Next::Traffic(None)) => traffic_open = false,
            Ok(Next::Resource(None)) => resource_open = false,
            Ok(Next::Closed) => break,
            Err(_) => {
                if dirty {
                    recorders.flush().await;
                    dirty = false;
                }
            }
        }
    }

    // Records already queued when the stop arrived are still delivered
    let mut remaining = 0usize;
    while let Some(record) = receivers.traffic.try_recv() {
        deliver(Record::Traffic(record), store.as_ref(), &recorders, &metrics).await;
        remaining += 1;
    }
    while let Some(record) = receivers.resource.try_recv() {
        deliver(Record::Resource(record), store.as_ref(), &recorders, &metrics).await;
        remaining += 1;
    }
    recorders.flush().await;
    debug!(remaining = remaining, "Record drain finished");

    receivers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;
    use crate::pipeline::{MemoryRecordStore, RecordPipeline, TrafficFilter};
    use crate::recorder::Recorder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tally {
        writes: AtomicUsize,
        flushes: AtomicUsize,
    }

    #[async_trait]
    impl Recorder for Tally {
        fn name(&self) -> &str {
            "tally"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn write(&self, _record: &Record) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn flush(&self) -> anyhow::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn traffic(i: i64) -> TrafficRecord {
        TrafficRecord {
            source: "a".to_string(),
            destination: "b".to_string(),
            protocol: Protocol::Udp,
            port: 53,
            result: true,
            reqid: "req".to_string(),
            ruleid: format!("rule-{i}"),
            latency: 1.0,
            timestamp: i,
        }
    }

    #[tokio::test]
    async fn test_manager_persists_and_publishes() {
        let (pipeline, receivers) = RecordPipeline::new(10);
        let store = Arc::new(MemoryRecordStore::new(100));
        let tally = Arc::new(Tally::default());
        let recorders = Arc::new(RecorderRegistry::new());
        recorders.subscribe(tally.clone());

        let manager = RecordManager::new(receivers, store.clone(), recorders);
        manager.start().await;
        assert!(manager.is_running().await);

        for i in 0..3 {
            pipeline.traffic().offer(traffic(i)).unwrap();
        }
        pipeline
            .resource()
            .offer(ResourceRecord {
                cpu_percent: 5.0,
                memory_percent: 6.0,
                timestamp: 1,
            })
            .unwrap();

        manager.stop().await;
        assert!(!manager.is_running().await);

        assert_eq!(store.traffic("req", &TrafficFilter::default()).len(), 3);
        assert_eq!(store.resources().len(), 1);
        assert_eq!(tally.writes.load(Ordering::SeqCst), 4);
        assert!(tally.flushes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_manager_restarts_with_same_queues() {
        let (pipeline, receivers) = RecordPipeline::new(10);
        let store = Arc::new(MemoryRecordStore::new(100));
        let manager = RecordManager::new(receivers, store.clone(), Arc::new(RecorderRegistry::new()));

        manager.start().await;
        manager.start().await;
        manager.stop().await;
        manager.stop().await;

        pipeline.traffic().offer(traffic(9)).unwrap();
        manager.start().await;
        manager.stop().await;

        assert_eq!(store.traffic_len(), 1);
    }

    #[tokio::test]
    async fn test_backlog_drains_while_resource_queue_idle() {
        let (pipeline, receivers) = RecordPipeline::new(500);
        let store = Arc::new(MemoryRecordStore::new(1000));
        let manager = RecordManager::new(receivers, store.clone(), Arc::new(RecorderRegistry::new()));

        for i in 0..200 {
            pipeline.traffic().offer(traffic(i)).unwrap();
        }
        manager.start().await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.traffic_len(), 200);
        assert!(manager.is_running().await);

        manager.stop().await;
    }
}
