//! Bounded record pipeline
//!
//! Producers push traffic and resource records into two independent bounded
//! queues. A [`RecordManager`] drains both, persists each record to a
//! [`RecordStore`] and hands it to every enabled recorder.

mod manager;
mod queue;
mod store;

pub use manager::{RecordManager, DRAIN_WAIT};
pub use queue::{bounded, RecordReceiver, RecordSender};
pub use store::{MemoryRecordStore, RecordStore, TrafficFilter};

use crate::config::ConfigProvider;
use crate::models::{ResourceRecord, TrafficRecord};

pub const TRAFFIC_QUEUE: &str = "traffic";
pub const RESOURCE_QUEUE: &str = "resource";

/// Producer side of both queues; cheap to clone
#[derive(Clone)]
pub struct RecordPipeline {
    traffic: RecordSender<TrafficRecord>,
    resource: RecordSender<ResourceRecord>,
}

/// Consumer side of both queues, owned by one drain task at a time
pub struct PipelineReceivers {
    pub traffic: RecordReceiver<TrafficRecord>,
    pub resource: RecordReceiver<ResourceRecord>,
}

impl RecordPipeline {
    /// Both queues hold at most `capacity` records each
    pub fn new(capacity: usize) -> (Self, PipelineReceivers) {
        let (traffic_tx, traffic_rx) = bounded(TRAFFIC_QUEUE, capacity);
        let (resource_tx, resource_rx) = bounded(RESOURCE_QUEUE, capacity);
        (
            Self {
                traffic: traffic_tx,
                resource: resource_tx,
            },
            PipelineReceivers {
                traffic: traffic_rx,
                resource: resource_rx,
            },
        )
    }

    /// Queues sized by `MAX_QUEUE_SIZE`
    pub fn from_config(config: &dyn ConfigProvider) -> (Self, PipelineReceivers) {
        Self::new(config.settings().max_queue_size)
    }

    pub fn traffic(&self) -> &RecordSender<TrafficRecord> {
        &self.traffic
    }

    pub fn resource(&self) -> &RecordSender<ResourceRecord> {
        &self.resource
    }
}
