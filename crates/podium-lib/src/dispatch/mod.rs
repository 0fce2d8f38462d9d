//! Fleet-wide fan-out of per-host operations
//!
//! Every job runs in its own task, bounded by `NODE_PREP_MAX_THREAD`. A job
//! that fails, times out in the transport or panics is logged and left out
//! of the result map; it never affects the other hosts.

mod plan;

pub use plan::{RegistrationMode, RegistrationPlan};

use crate::config::SharedConfig;
use crate::health::FleetHealth;
use crate::observability::{PodiumMetrics, StructuredLogger};
use crate::rpc::{with_session, AgentSession, SharedConnector};
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// One unit of per-host work
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchJob<P> {
    pub host: String,
    pub operation: &'static str,
    pub payload: P,
}

impl<P> DispatchJob<P> {
    pub fn new(host: impl Into<String>, operation: &'static str, payload: P) -> Self {
        Self {
            host: host.into(),
            operation,
            payload,
        }
    }
}

/// Build one job per `(host, payload)` pair
pub fn jobs<P>(
    operation: &'static str,
    payloads: impl IntoIterator<Item = (String, P)>,
) -> Vec<DispatchJob<P>> {
    payloads
        .into_iter()
        .map(|(host, payload)| DispatchJob::new(host, operation, payload))
        .collect()
}

#[derive(Clone)]
pub struct DispatchExecutor {
    connector: SharedConnector,
    config: SharedConfig,
    health: FleetHealth,
    metrics: PodiumMetrics,
    logger: StructuredLogger,
}

impl DispatchExecutor {
    pub fn new(connector: SharedConnector, config: SharedConfig, health: FleetHealth) -> Self {
        Self {
            connector,
            config,
            health,
            metrics: PodiumMetrics::new(),
            logger: StructuredLogger::new("podium"),
        }
    }

    /// Run `op(host, payload)` for every job concurrently
    ///
    /// The returned map holds an entry only for hosts whose operation
    /// completed successfully.
    pub async fn run<P, R, F, Fut>(&self, jobs: Vec<DispatchJob<P>>, op: F) -> HashMap<String, R>
    where
        P: Send + 'static,
        R: Send + 'static,
        F: Fn(String, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let requested = jobs.len();
        let Some(operation) = jobs.first().map(|j| j.operation) else {
            return HashMap::new();
        };
        let semaphore = Arc::new(Semaphore::new(
            self.config.settings().node_prep_max_thread.max(1),
        ));
        let op = Arc::new(op);

        let mut handles = Vec::with_capacity(requested);
        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let op = Arc::clone(&op);
            let host = job.host.clone();
            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (Err(anyhow::anyhow!("dispatch pool closed")), Duration::ZERO);
                };
                let started = Instant::now();
                let result = op(job.host, job.payload).await;
                (result, started.elapsed())
            });
            handles.push((host, job.operation, handle));
        }

        let mut results = HashMap::with_capacity(requested);
        for (host, operation, handle) in handles {
            match handle.await {
                Ok((Ok(value), elapsed)) => {
                    debug!(host = %host, operation = operation, elapsed_ms = elapsed.as_millis() as u64, "Dispatch succeeded");
                    self.metrics
                        .observe_dispatch(operation, true, elapsed.as_secs_f64());
                    self.health.record_host(&host, operation, None).await;
                    results.insert(host, value);
                }
                Ok((Err(e), elapsed)) => {
                    error!(host = %host, operation = operation, error = %format!("{e:#}"), "Dispatch failed");
                    self.metrics
                        .observe_dispatch(operation, false, elapsed.as_secs_f64());
                    self.health
                        .record_host(&host, operation, Some(e.to_string()))
                        .await;
                }
                Err(e) => {
                    error!(host = %host, operation = operation, error = %e, "Dispatch task aborted");
                    self.metrics.observe_dispatch(operation, false, 0.0);
                    self.health
                        .record_host(&host, operation, Some(e.to_string()))
                        .await;
                }
            }
        }

        self.logger
            .log_dispatch_summary(operation, requested, results.len());
        results
    }

    /// Like [`run`](Self::run), but `op` gets a fresh session to the job's
    /// host that is closed again once `op` returns
    pub async fn run_sessions<P, R, F, Fut>(
        &self,
        jobs: Vec<DispatchJob<P>>,
        op: F,
    ) -> HashMap<String, R>
    where
        P: Send + 'static,
        R: Send + 'static,
        F: Fn(Arc<dyn AgentSession>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let connector = Arc::clone(&self.connector);
        let op = Arc::new(op);
        self.run(jobs, move |host, payload| {
            let connector = Arc::clone(&connector);
            let op = Arc::clone(&op);
            async move {
                with_session(connector.as_ref(), &host, move |session| op(session, payload)).await
            }
        })
        .await
    }
}
