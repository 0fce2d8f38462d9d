//! The coordinator's own record producers and drain

use crate::config::SharedConfig;
use crate::health::{components, FleetHealth};
use crate::models::TrafficRule;
use crate::pipeline::{MemoryRecordStore, RecordManager, RecordPipeline};
use crate::recorder::RecorderRegistry;
use crate::sampler::{MockTrafficSource, PeriodicSampler, ResourceSource, SampleInterval};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub resource_sampler: bool,
    pub mock_traffic: bool,
    pub record_manager: bool,
    pub traffic_queue_depth: usize,
    pub resource_queue_depth: usize,
}

/// Local resource sampler, mock traffic generator and record manager
/// sharing one pair of bounded queues
pub struct PrimaryMonitor {
    pipeline: RecordPipeline,
    store: Arc<MemoryRecordStore>,
    manager: RecordManager,
    resources: PeriodicSampler<ResourceSource>,
    mock_traffic: PeriodicSampler<MockTrafficSource>,
    health: FleetHealth,
}

impl PrimaryMonitor {
    pub fn new(config: SharedConfig, recorders: Arc<RecorderRegistry>, health: FleetHealth) -> Self {
        let settings = config.settings();
        let (pipeline, receivers) = RecordPipeline::new(settings.max_queue_size);
        let store = Arc::new(MemoryRecordStore::new(settings.max_queue_size));
        let manager = RecordManager::new(receivers, store.clone(), recorders);
        let resources = PeriodicSampler::new(
            ResourceSource::new(),
            pipeline.resource().clone(),
            SampleInterval::Live(Arc::clone(&config)),
        );
        let mock_traffic = PeriodicSampler::new(
            MockTrafficSource::new(),
            pipeline.traffic().clone(),
            SampleInterval::Live(config),
        );
        Self {
            pipeline,
            store,
            manager,
            resources,
            mock_traffic,
            health,
        }
    }

    pub fn pipeline(&self) -> &RecordPipeline {
        &self.pipeline
    }

    /// Records drained on this node
    pub fn store(&self) -> &Arc<MemoryRecordStore> {
        &self.store
    }

    pub async fn start(&self) {
        self.manager.start().await;
        self.resources.start().await;
        self.health.set_healthy(components::PIPELINE).await;
        self.health.set_healthy(components::MONITOR).await;
        self.health.set_ready(true).await;
    }

    pub async fn stop(&self) {
        self.mock_traffic.stop().await;
        self.resources.stop().await;
        self.manager.stop().await;
        self.health.set_ready(false).await;
    }

    /// Feed placeholder traffic records for `rules` into the pipeline
    pub async fn start_mock_traffic(&self, rules: Vec<TrafficRule>) {
        self.mock_traffic.source().register_traffic(rules);
        self.mock_traffic.start().await;
    }

    pub async fn stop_mock_traffic(&self) {
        self.mock_traffic.stop().await;
    }

    pub async fn status(&self) -> MonitorStatus {
        let status = MonitorStatus {
            resource_sampler: self.resources.is_running().await,
            mock_traffic: self.mock_traffic.is_running().await,
            record_manager: self.manager.is_running().await,
            traffic_queue_depth: self.pipeline.traffic().len(),
            resource_queue_depth: self.pipeline.resource().len(),
        };
        if status.record_manager && !status.resource_sampler {
            self.health
                .set_degraded(components::MONITOR, "resource sampler is not running")
                .await;
        }
        status
    }
}
