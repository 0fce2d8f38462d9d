//! Fleet-wide result queries
//!
//! Records stay on the agents that produced them. Queries go to every host
//! that sources a rule of the request, with filters pushed down, and the
//! per-host answers are merged here.

use crate::config::SharedConfig;
use crate::dispatch::{jobs, DispatchExecutor};
use crate::error::PodiumError;
use crate::models::{decode_records, LatencyMethod, TrafficRecord};
use crate::pipeline::TrafficFilter;
use crate::registry::EndpointRegistry;
use crate::rules::RuleStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Pass and fail counts for a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub success: usize,
    pub failure: usize,
}

impl TrafficStats {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }

    /// Share of passing records; 0 when nothing was recorded
    pub fn pass_percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => round2(self.success as f64 * 100.0 / total as f64),
        }
    }

    /// Share of failing records; 100 when nothing was recorded
    pub fn fail_percent(&self) -> f64 {
        match self.total() {
            0 => 100.0,
            total => round2(self.failure as f64 * 100.0 / total as f64),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct ResultAggregator {
    executor: DispatchExecutor,
    config: SharedConfig,
    rules: Arc<RuleStore>,
    registry: Arc<EndpointRegistry>,
}

impl ResultAggregator {
    pub fn new(
        executor: DispatchExecutor,
        config: SharedConfig,
        rules: Arc<RuleStore>,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        Self {
            executor,
            config,
            rules,
            registry,
        }
    }

    /// Hosts that source at least one rule of `reqid`
    pub fn hosts_for(&self, reqid: &str) -> BTreeSet<String> {
        self.rules
            .by_reqid(reqid)
            .iter()
            .filter_map(|rule| {
                let host = self.registry.resolve(&rule.src);
                if host.is_none() {
                    warn!(reqid = %reqid, src = %rule.src, "No host found for rule source");
                }
                host
            })
            .collect()
    }

    /// `[now - skew - duration, now - skew]`, skipping records that may not
    /// be queryable yet
    pub fn results_window(&self, duration: Duration) -> (i64, i64) {
        let until = chrono::Utc::now().timestamp()
            - self.config.settings().traffic_stats_query_latency as i64;
        (until - duration.as_secs() as i64, until)
    }

    /// Merged records of `reqid` from every involved host
    ///
    /// Hosts that fail to answer contribute nothing.
    pub async fn get_results(
        &self,
        reqid: &str,
        duration: Option<Duration>,
        mut filter: TrafficFilter,
    ) -> Vec<TrafficRecord> {
        if let Some(duration) = duration {
            filter.timestamp = Some(self.results_window(duration));
        }
        let hosts = self.hosts_for(reqid);
        let reqid = reqid.to_string();
        let payloads = hosts
            .into_iter()
            .map(|host| (host, (reqid.clone(), filter.clone())));

        let per_host = self
            .executor
            .run_sessions(
                jobs("traffic_results", payloads),
                |session, (reqid, filter): (String, TrafficFilter)| async move {
                    let blob = session.traffic_results(&reqid, &filter).await?;
                    Ok(decode_records(&blob)?)
                },
            )
            .await;

        let mut by_host: Vec<_> = per_host.into_iter().collect();
        by_host.sort_by(|a, b| a.0.cmp(&b.0));
        by_host.into_iter().flat_map(|(_, records)| records).collect()
    }

    /// Count passing and failing records, each with its own pushed-down query
    pub async fn get_traffic_stats(&self, reqid: &str, duration: Option<Duration>) -> TrafficStats {
        let success = self
            .get_results(reqid, duration, TrafficFilter::default().with_result(true))
            .await
            .len();
        let failure = self
            .get_results(reqid, duration, TrafficFilter::default().with_result(false))
            .await
            .len();
        TrafficStats { success, failure }
    }

    pub async fn get_traffic_pass_percent(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.get_traffic_stats(reqid, duration).await.pass_percent()
    }

    pub async fn get_traffic_fail_percent(&self, reqid: &str, duration: Option<Duration>) -> f64 {
        self.get_traffic_stats(reqid, duration).await.fail_percent()
    }

    /// Reduce per-host latency aggregates with the same method again
    ///
    /// An average here is the mean of per-host averages, not of all records.
    /// Hosts without a value are ignored; an unknown method or no values at
    /// all yields 0.
    pub async fn get_latency(
        &self,
        reqid: &str,
        method: &str,
        duration: Option<Duration>,
        mut filter: TrafficFilter,
    ) -> f64 {
        let Some(method) = LatencyMethod::parse(method) else {
            error!(
                error = %PodiumError::UnknownReductionMethod(method.to_string()),
                "Invalid method for get latency"
            );
            return 0.0;
        };
        if let Some(duration) = duration {
            let now = chrono::Utc::now().timestamp();
            filter.timestamp = Some((now - duration.as_secs() as i64, now));
        }

        let reqid = reqid.to_string();
        let payloads = self
            .hosts_for(&reqid)
            .into_iter()
            .map(|host| (host, (reqid.clone(), filter.clone())));

        let per_host = self
            .executor
            .run_sessions(
                jobs("latency_stat", payloads),
                move |session, (reqid, filter): (String, TrafficFilter)| async move {
                    session.latency_stat(&reqid, method, &filter).await
                },
            )
            .await;

        let values: Vec<f64> = per_host.into_values().flatten().collect();
        method.reduce(&values).map(round2).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_percentages() {
        let stats = TrafficStats::default();
        assert_eq!(stats.pass_percent(), 0.0);
        assert_eq!(stats.fail_percent(), 100.0);
    }

    #[test]
    fn test_percentages_round_to_two_places() {
        let stats = TrafficStats {
            success: 2,
            failure: 1,
        };
        assert_eq!(stats.pass_percent(), 66.67);
        assert_eq!(stats.fail_percent(), 33.33);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(15.0), 15.0);
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(2.675_1), 2.68);
    }
}
