//! End-to-end coordinator scenarios against a fake fleet

use super::*;
use crate::config::{PodiumSettings, StaticConfig};
use crate::testing::FakeFleet;

fn settings() -> PodiumSettings {
    PodiumSettings {
        lydian_service_wait_time: 1,
        ..Default::default()
    }
}

fn podium_with(fleet: &FakeFleet, settings: PodiumSettings) -> Podium {
    Podium::builder(Arc::new(StaticConfig(settings)), Arc::new(fleet.clone()))
        .provisioner(Arc::new(fleet.clone()))
        .recorders(Arc::new(RecorderRegistry::new()))
        .build()
}

async fn podium_for(fleet: &FakeFleet, hosts: &[&str]) -> Podium {
    let podium = podium_with(fleet, settings());
    for host in hosts {
        podium.add_endpoints(host).await;
    }
    podium
}

fn record(reqid: &str, result: bool, latency: f64) -> TrafficRecord {
    TrafficRecord {
        source: "h1".to_string(),
        destination: "h2".to_string(),
        protocol: Protocol::Tcp,
        port: 5000,
        result,
        reqid: reqid.to_string(),
        ruleid: "rule".to_string(),
        latency,
        timestamp: chrono::Utc::now().timestamp() - 10,
    }
}

#[tokio::test]
async fn test_mesh_registers_all_ordered_pairs() {
    let hosts = ["h1", "h2", "h3"];
    let fleet = FakeFleet::new(hosts);
    let podium = podium_for(&fleet, &hosts).await;

    let reqid = podium
        .run_mesh_ping(&hosts, 5000, Protocol::Tcp, true, None)
        .await;

    let rules = podium.get_rules_by_reqid(&reqid);
    assert_eq!(rules.len(), 6);
    assert!(rules.iter().all(|r| r.reqid == reqid));
    let ruleids: BTreeSet<&str> = rules.iter().map(|r| r.ruleid.as_str()).collect();
    assert_eq!(ruleids.len(), 6);
    assert!(rules.iter().all(|r| r.state == RuleState::Registered));
    // two rules as server and two as client on every host
    for host in hosts {
        assert_eq!(fleet.registered(host).len(), 4);
    }
}

#[tokio::test]
async fn test_phased_registration_finishes_servers_before_clients() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;
    fleet.set_delay("h2", Duration::from_millis(50));

    podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, None)
        .await;

    let calls = fleet.calls("register_traffic");
    let server = calls.iter().find(|c| c.host == "h2").unwrap();
    let client = calls.iter().find(|c| c.host == "h1").unwrap();
    assert!(server.finished <= client.started);
}

#[tokio::test]
async fn test_merged_registration_uses_one_call_per_host() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_with(
        &fleet,
        PodiumSettings {
            traffic_start_servers_first: false,
            ..settings()
        },
    );
    podium.add_endpoints("h1").await;
    podium.add_endpoints("h2").await;
    fleet.set_delay("h1", Duration::from_millis(30));
    fleet.set_delay("h2", Duration::from_millis(30));

    podium
        .run_mesh_ping(&["h1", "h2"], 80, Protocol::Udp, true, None)
        .await;

    let calls = fleet.calls("register_traffic");
    assert_eq!(calls.len(), 2);
    // single wave: neither call waited for the other
    assert!(calls[0].started < calls[1].finished && calls[1].started < calls[0].finished);
    assert_eq!(fleet.registered("h1").len(), 2);
    assert_eq!(fleet.registered("h2").len(), 2);
}

#[tokio::test]
async fn test_unreachable_host_is_reported_and_others_proceed() {
    let hosts = ["h1", "h2", "h3"];
    let fleet = FakeFleet::new(hosts);
    let podium = podium_for(&fleet, &hosts).await;
    fleet.set_reachable("h3", false);

    let intents = vec![
        TrafficIntent::new("h1", "h2", 80, Protocol::Tcp),
        TrafficIntent::new("h1", "h3", 80, Protocol::Tcp),
    ];
    let outcome = podium.register_traffic(intents).await;

    assert_eq!(outcome.rules, 2);
    assert_eq!(outcome.registered, 1);
    assert_eq!(outcome.failed_hosts, vec!["h3".to_string()]);
    assert_eq!(fleet.registered("h2").len(), 1);
    assert_eq!(fleet.registered("h1").len(), 2);
}

#[tokio::test]
async fn test_unresolved_and_invalid_intents_are_skipped() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;

    let outcome = podium
        .register_traffic(vec![
            TrafficIntent::new("h1", "10.99.0.1", 80, Protocol::Tcp),
            TrafficIntent::new("h1", "h2", 0, Protocol::Tcp),
            TrafficIntent::new("h1", "h2", 80, Protocol::Tcp),
        ])
        .await;

    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.rules, 1);
    assert_eq!(podium.rules().len(), 1);
}

#[tokio::test]
async fn test_intent_round_trips_through_rule_store() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;

    let reqid = podium
        .run_traffic("h1", "h2", 8080, Protocol::Http, false, None)
        .await;
    let other = podium
        .run_traffic("h1", "h2", 8080, Protocol::Http, false, None)
        .await;

    let rules = podium.get_rules_by_reqid(&reqid);
    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!((rule.src.as_str(), rule.dst.as_str()), ("h1", "h2"));
    assert_eq!(rule.port, 8080);
    assert_eq!(rule.protocol, Protocol::Http);
    assert!(!rule.connected);
    assert!(!rule.ruleid.is_empty());
    assert_ne!(rule.ruleid, podium.get_rules_by_reqid(&other)[0].ruleid);
}

#[tokio::test]
async fn test_start_and_stop_go_to_source_hosts() {
    let hosts = ["h1", "h2", "h3"];
    let fleet = FakeFleet::new(hosts);
    let podium = podium_for(&fleet, &hosts).await;
    let reqid = podium
        .run_mesh_ping(&hosts, 5000, Protocol::Tcp, true, None)
        .await;
    fleet.set_reachable("h3", false);

    let started = podium.start_traffic(&reqid).await;
    assert_eq!(started, BTreeSet::from(["h1".to_string(), "h2".to_string()]));
    assert_eq!(fleet.started("h1").len(), 2);

    let rules = podium.get_rules_by_reqid(&reqid);
    for rule in &rules {
        let expected = if rule.src == "h3" {
            RuleState::Registered
        } else {
            RuleState::Running
        };
        assert_eq!(rule.state, expected, "rule from {}", rule.src);
    }

    fleet.set_reachable("h3", true);
    let stopped = podium.stop_traffic(&reqid).await;
    assert_eq!(stopped.len(), 3);
    assert!(podium
        .get_rules_by_reqid(&reqid)
        .iter()
        .all(|r| r.state == RuleState::Stopped));
}

#[tokio::test]
async fn test_run_traffic_with_duration_stops_afterwards() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;

    let reqid = podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, Some(Duration::from_millis(10)))
        .await;

    let rule = &podium.get_rules_by_reqid(&reqid)[0];
    assert_eq!(fleet.stopped("h1"), vec![rule.ruleid.clone()]);
}

#[tokio::test]
async fn test_latency_reduces_across_hosts() {
    let hosts = ["A", "B", "C"];
    let fleet = FakeFleet::new(hosts);
    let podium = podium_for(&fleet, &hosts).await;
    let reqid = podium
        .run_mesh_ping(&hosts, 5000, Protocol::Tcp, true, None)
        .await;
    fleet.set_latency("A", Some(10.0));
    fleet.set_latency("B", Some(20.0));
    fleet.set_latency("C", None);

    assert_eq!(podium.get_avg_latency(&reqid, None).await, 15.0);
    assert_eq!(podium.get_min_latency(&reqid, None).await, 10.0);
    assert_eq!(podium.get_max_latency(&reqid, None).await, 20.0);
    assert_eq!(
        podium
            .get_latency(&reqid, "bogus", None, TrafficFilter::default())
            .await,
        0.0
    );
}

#[tokio::test]
async fn test_latency_without_values_is_zero() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;
    let reqid = podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, None)
        .await;

    assert_eq!(podium.get_avg_latency(&reqid, None).await, 0.0);
}

#[tokio::test]
async fn test_zero_records_give_asymmetric_percentages() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;
    let reqid = podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, None)
        .await;

    assert_eq!(podium.get_traffic_pass_percent(&reqid, None).await, 0.0);
    assert_eq!(podium.get_traffic_fail_percent(&reqid, None).await, 100.0);
}

#[tokio::test]
async fn test_stats_push_result_filter_to_agents() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;
    let reqid = podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, None)
        .await;
    fleet.set_records(
        "h1",
        vec![
            record(&reqid, true, 1.0),
            record(&reqid, true, 2.0),
            record(&reqid, true, 3.0),
            record(&reqid, false, 0.0),
            record("someone-else", false, 0.0),
        ],
    );

    let stats = podium.get_traffic_stats(&reqid, None).await;
    assert_eq!(stats, TrafficStats { success: 3, failure: 1 });
    assert_eq!(podium.get_traffic_pass_percent(&reqid, None).await, 75.0);
    assert_eq!(podium.get_traffic_fail_percent(&reqid, None).await, 25.0);

    let results: Vec<Option<bool>> = fleet.filters("h1").iter().map(|f| f.result).collect();
    assert!(results.contains(&Some(true)));
    assert!(results.contains(&Some(false)));
    // only source hosts are queried
    assert!(fleet.filters("h2").is_empty());
}

#[tokio::test]
async fn test_results_window_is_shifted_by_query_latency() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    let podium = podium_for(&fleet, &["h1", "h2"]).await;
    let reqid = podium
        .run_traffic("h1", "h2", 80, Protocol::Tcp, true, None)
        .await;
    fleet.set_records("h1", vec![record(&reqid, true, 1.0)]);

    let before = chrono::Utc::now().timestamp();
    let records = podium
        .get_results(&reqid, Some(Duration::from_secs(60)), TrafficFilter::default())
        .await;
    let after = chrono::Utc::now().timestamp();

    assert_eq!(records.len(), 1);
    let (since, until) = fleet.filters("h1")[0].timestamp.unwrap();
    assert_eq!(until - since, 60);
    assert!(until >= before - 2 && until <= after - 2);
}

#[tokio::test]
async fn test_add_hosts_provisions_and_registers() {
    let fleet = FakeFleet::new(["h1", "h2", "h3"]);
    fleet.set_interfaces("h1", [("eth0", vec!["10.0.0.1"])]);
    fleet.set_reachable("h3", false);
    let podium = podium_with(&fleet, settings());

    let added = podium.add_hosts_str("h1, h2,h3").await;

    assert_eq!(added.len(), 2);
    assert_eq!(added["h1"], 2);
    assert!(fleet.prepped("h1"));
    assert!(!fleet.prepped("h3"));
    assert_eq!(podium.get_ep_host("10.0.0.1").as_deref(), Some("h1"));
    assert!(podium.get_ep_host("h3").is_none());
}

#[tokio::test]
async fn test_wait_on_host_gives_up() {
    let fleet = FakeFleet::new(["h1"]);
    fleet.set_reachable("h1", false);
    let podium = podium_with(&fleet, settings());

    assert!(!podium.is_host_up("h1").await);
    assert!(
        !podium
            .wait_on_host("h1", Some(Duration::from_millis(20)))
            .await
    );

    fleet.set_reachable("h1", true);
    assert!(podium.wait_on_host("h1", None).await);
}

#[tokio::test]
async fn test_host_with_stopped_monitor_is_up() {
    let fleet = FakeFleet::new(["h1"]);
    fleet.set_interfaces("h1", [("eth0", vec!["10.0.0.1"])]);
    fleet.set_monitor_running("h1", false);
    let mut settings = settings();
    settings.lydian_service_wait_time = 5;
    let podium = podium_with(&fleet, settings);

    assert!(podium.is_host_up("h1").await);

    let started = tokio::time::Instant::now();
    let added = podium.add_hosts(&["h1"]).await;
    assert_eq!(added["h1"], 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_stop_service_cleans_reachable_hosts() {
    let fleet = FakeFleet::new(["h1", "h2"]);
    fleet.set_reachable("h2", false);
    let podium = podium_with(&fleet, settings());

    let cleaned = podium.stop_service(&["h1", "h2"], true).await;

    assert_eq!(cleaned, BTreeSet::from(["h1".to_string()]));
    assert!(fleet.cleaned("h1"));
}

#[tokio::test]
async fn test_remote_controls_resolve_endpoint_host() {
    let fleet = FakeFleet::new(["h1"]);
    fleet.set_interfaces("h1", [("ens3", vec!["192.168.1.4"])]);
    let podium = podium_for(&fleet, &["h1"]).await;

    podium
        .set_param("192.168.1.4", "MAX_QUEUE_SIZE", "10")
        .await
        .unwrap();
    assert_eq!(fleet.param("h1", "MAX_QUEUE_SIZE").as_deref(), Some("10"));
    assert_eq!(
        podium
            .get_param("192.168.1.4", "MAX_QUEUE_SIZE")
            .await
            .unwrap()
            .as_deref(),
        Some("10")
    );

    podium.stop_resource_monitoring("h1").await.unwrap();
    assert!(!fleet.monitor_running("h1"));
    assert!(podium.is_host_up("h1").await);
    podium.start_resource_monitoring("h1").await.unwrap();
    assert!(fleet.monitor_running("h1"));

    podium.start_pcap("h1", "cap.pcap", "eth0", "").await.unwrap();
    assert_eq!(fleet.pcaps("h1"), vec!["cap.pcap".to_string()]);
    podium.stop_pcap("h1", "cap.pcap").await.unwrap();
    assert!(fleet.pcaps("h1").is_empty());

    let err = podium.get_param("10.10.10.10", "X").await.unwrap_err();
    assert!(err.to_string().contains("10.10.10.10"));
}

#[tokio::test]
async fn test_primary_monitor_drives_readiness() {
    let fleet = FakeFleet::new([]);
    let podium = podium_with(&fleet, settings());
    assert!(!podium.health().readiness().await.ready);

    podium.start_primary_monitor().await;
    let status = podium.monitor().status().await;
    assert!(status.resource_sampler);
    assert!(status.record_manager);
    assert!(podium.health().readiness().await.ready);

    podium.stop_primary_monitor().await;
    assert!(!podium.monitor().status().await.record_manager);
    assert!(!podium.health().readiness().await.ready);
}

#[tokio::test]
async fn test_mock_traffic_reaches_local_store() {
    let fleet = FakeFleet::new([]);
    let podium = podium_with(
        &fleet,
        PodiumSettings {
            resource_monitor_interval: 1,
            ..settings()
        },
    );
    let rule = TrafficRule::from_intent(TrafficIntent::new("h1", "h2", 80, Protocol::Tcp)).unwrap();
    let reqid = rule.reqid.clone();

    podium.start_primary_monitor().await;
    podium.monitor().start_mock_traffic(vec![rule]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    podium.stop_primary_monitor().await;

    let stored = podium
        .monitor()
        .store()
        .traffic(&reqid, &TrafficFilter::default());
    assert!(!stored.is_empty());
}
