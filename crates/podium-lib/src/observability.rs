//! Observability infrastructure for the coordinator
//!
//! Provides:
//! - Prometheus metrics (dispatch outcomes and latency, queue traffic, recorder errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for agent RPC latency (in seconds)
const DISPATCH_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PodiumMetricsInner> = OnceLock::new();

struct PodiumMetricsInner {
    dispatch_calls: IntCounterVec,
    dispatch_latency_seconds: HistogramVec,
    records_enqueued: IntCounterVec,
    records_dropped: IntCounterVec,
    records_drained: IntCounterVec,
    queue_depth: IntGaugeVec,
    recorder_errors: IntCounterVec,
    endpoints_registered: IntGauge,
    rules_registered: IntGauge,
}

impl PodiumMetricsInner {
    fn new() -> Self {
        Self {
            dispatch_calls: register_int_counter_vec!(
                "podium_dispatch_calls_total",
                "Per-host agent operations by outcome",
                &["operation", "outcome"]
            )
            .expect("Failed to register dispatch_calls_total"),

            dispatch_latency_seconds: register_histogram_vec!(
                "podium_dispatch_latency_seconds",
                "Time spent in a single per-host agent operation",
                &["operation"],
                DISPATCH_BUCKETS.to_vec()
            )
            .expect("Failed to register dispatch_latency_seconds"),

            records_enqueued: register_int_counter_vec!(
                "podium_records_enqueued_total",
                "Records accepted by a bounded queue",
                &["queue"]
            )
            .expect("Failed to register records_enqueued_total"),

            records_dropped: register_int_counter_vec!(
                "podium_records_dropped_total",
                "Records dropped because a bounded queue was full",
                &["queue"]
            )
            .expect("Failed to register records_dropped_total"),

            records_drained: register_int_counter_vec!(
                "podium_records_drained_total",
                "Records drained, persisted and published",
                &["queue"]
            )
            .expect("Failed to register records_drained_total"),

            queue_depth: register_int_gauge_vec!(
                "podium_queue_depth",
                "Records currently waiting in a bounded queue",
                &["queue"]
            )
            .expect("Failed to register queue_depth"),

            recorder_errors: register_int_counter_vec!(
                "podium_recorder_errors_total",
                "Failed or timed out recorder writes",
                &["recorder"]
            )
            .expect("Failed to register recorder_errors_total"),

            endpoints_registered: register_int_gauge!(
                "podium_endpoints_registered",
                "Endpoints known to the registry"
            )
            .expect("Failed to register endpoints_registered"),

            rules_registered: register_int_gauge!(
                "podium_rules_registered",
                "Rules held in the rule store"
            )
            .expect("Failed to register rules_registered"),
        }
    }
}

/// Lightweight handle to the process-wide metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct PodiumMetrics {
    _private: (),
}

impl Default for PodiumMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PodiumMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PodiumMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PodiumMetricsInner {
        GLOBAL_METRICS.get_or_init(PodiumMetricsInner::new)
    }

    /// Record one per-host operation
    pub fn observe_dispatch(&self, operation: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "ok" } else { "error" };
        self.inner()
            .dispatch_calls
            .with_label_values(&[operation, outcome])
            .inc();
        self.inner()
            .dispatch_latency_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn inc_enqueued(&self, queue: &str) {
        self.inner().records_enqueued.with_label_values(&[queue]).inc();
    }

    pub fn inc_dropped(&self, queue: &str) {
        self.inner().records_dropped.with_label_values(&[queue]).inc();
    }

    pub fn inc_drained(&self, queue: &str) {
        self.inner().records_drained.with_label_values(&[queue]).inc();
    }

    pub fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.inner()
            .queue_depth
            .with_label_values(&[queue])
            .set(depth as i64);
    }

    pub fn inc_recorder_errors(&self, recorder: &str) {
        self.inner()
            .recorder_errors
            .with_label_values(&[recorder])
            .inc();
    }

    pub fn set_endpoints_registered(&self, count: usize) {
        self.inner().endpoints_registered.set(count as i64);
    }

    pub fn set_rules_registered(&self, count: usize) {
        self.inner().rules_registered.set(count as i64);
    }
}

/// Structured logger for coordinator lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    coordinator: String,
}

impl StructuredLogger {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
        }
    }

    pub fn log_startup(&self, version: &str, api_port: u16) {
        info!(
            event = "podium_started",
            coordinator = %self.coordinator,
            version = %version,
            api_port = api_port,
            "Podium started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "podium_shutdown",
            coordinator = %self.coordinator,
            reason = %reason,
            "Podium shutting down"
        );
    }

    /// Log the outcome of a rule registration batch
    pub fn log_traffic_registered(&self, reqid: &str, rules: usize, skipped: usize, phased: bool) {
        info!(
            event = "traffic_registered",
            coordinator = %self.coordinator,
            reqid = %reqid,
            rules = rules,
            skipped = skipped,
            phased = phased,
            "Traffic rules registered"
        );
    }

    /// Log how many hosts completed a fan-out
    pub fn log_dispatch_summary(&self, operation: &str, requested: usize, completed: usize) {
        if completed < requested {
            warn!(
                event = "dispatch_summary",
                coordinator = %self.coordinator,
                operation = %operation,
                requested = requested,
                completed = completed,
                missing = requested - completed,
                "Dispatch completed on a subset of hosts"
            );
        } else {
            info!(
                event = "dispatch_summary",
                coordinator = %self.coordinator,
                operation = %operation,
                requested = requested,
                completed = completed,
                "Dispatch completed"
            );
        }
    }
}
