use aks_fleet_advisor::analysis::pressure::NodeUsage;
use aks_fleet_advisor::tools::pressure::pressure_from_parts;
use aks_fleet_advisor::tools::upgrade_progress::progress_from_parts;
use aks_fleet_advisor::{
    categorize_failure, classify_pressure, evaluate_blockers, fan_out, is_unhealthy,
    parse_cpu_millicores, parse_memory_bytes, BudgetValue, ClusterTarget, ContainerInfo,
    ContainerState, EventInfo, FailureCategory, NodeInfo, PdbInfo, PodInfo, PodPhase,
    PressureLevel, Thresholds, UpgradeState,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

fn node(name: &str, pool: &str, cpu: &str, ready: bool) -> NodeInfo {
    NodeInfo {
        name: name.to_string(),
        pool: Some(pool.to_string()),
        unschedulable: false,
        allocatable_cpu: cpu.to_string(),
        allocatable_memory: "16Gi".to_string(),
        ready,
        kubelet_version: "v1.28.5".to_string(),
    }
}

fn target(id: &str) -> ClusterTarget {
    ClusterTarget {
        id: id.to_string(),
        environment: "prod".to_string(),
        region: "westeurope".to_string(),
        subscription_id: "11111111-2222-3333-4444-555555555555".to_string(),
        resource_group: "rg-fleet".to_string(),
        cluster_name: format!("aks-{id}"),
        kube_context: String::new(),
    }
}

#[test]
fn test_cpu_parsing_contract() {
    // "m" suffix: numeric prefix unchanged; bare integers: cores x1000.
    for (input, expected) in [("250m", 250.0), ("1m", 1.0), ("4", 4000.0), ("0.5", 500.0)] {
        assert_eq!(parse_cpu_millicores(input), expected);
    }
    // Unparseable input degrades without panicking.
    assert_eq!(parse_cpu_millicores("four cores"), 0.0);
}

#[test]
fn test_memory_parsing_contract() {
    assert_eq!(parse_memory_bytes("1Ki"), 1024.0);
    assert_eq!(parse_memory_bytes("1Mi"), 1024f64.powi(2));
    assert_eq!(parse_memory_bytes("1Gi"), 1024f64.powi(3));
    assert_eq!(parse_memory_bytes("1Ti"), 1024f64.powi(4));
    assert_eq!(parse_memory_bytes("1k"), 1000.0);
    assert_eq!(parse_memory_bytes("1M"), 1e6);
    assert_eq!(parse_memory_bytes("1G"), 1e9);
    assert_eq!(parse_memory_bytes("123456"), 123456.0);
    assert_eq!(parse_memory_bytes("lots"), 0.0);
}

#[test]
fn test_pressure_classifier_totality() {
    let thresholds = Thresholds::default();
    assert_eq!(
        classify_pressure(None, None, 0, &thresholds),
        PressureLevel::Ok
    );
    // Monotonic in every signal.
    let mut last = PressureLevel::Ok;
    for cpu in [0.0, 50.0, 75.0, 90.0, 100.0] {
        let level = classify_pressure(Some(cpu), None, 0, &thresholds);
        assert!(level >= last);
        last = level;
    }
}

#[test]
fn test_pool_pressure_scenario_ok_at_62_5() {
    let nodes = vec![
        node("node-1", "nodepool1", "4000m", true),
        node("node-2", "nodepool1", "4000m", true),
    ];
    let mut metrics = HashMap::new();
    metrics.insert(
        "node-1".to_string(),
        NodeUsage { cpu: "3000m".to_string(), memory: "4Gi".to_string() },
    );
    metrics.insert(
        "node-2".to_string(),
        NodeUsage { cpu: "2000m".to_string(), memory: "4Gi".to_string() },
    );

    let response = pressure_from_parts(
        "prod-weu".to_string(),
        &nodes,
        Some(&metrics),
        &[],
        &BTreeMap::new(),
        &Thresholds::default(),
        Vec::new(),
    );

    assert_eq!(response.pools[0].cpu_percent, Some(62.5));
    assert_eq!(response.pools[0].pressure_level, PressureLevel::Ok);
}

#[test]
fn test_pool_pressure_scenario_critical_at_95() {
    let nodes = vec![node("node-1", "nodepool1", "4000m", true)];
    let mut metrics = HashMap::new();
    metrics.insert(
        "node-1".to_string(),
        NodeUsage { cpu: "3800m".to_string(), memory: "1Gi".to_string() },
    );

    let response = pressure_from_parts(
        "prod-weu".to_string(),
        &nodes,
        Some(&metrics),
        &[],
        &BTreeMap::new(),
        &Thresholds::default(),
        Vec::new(),
    );

    assert_eq!(response.pools[0].cpu_percent, Some(95.0));
    assert_eq!(response.pools[0].pressure_level, PressureLevel::Critical);
}

#[test]
fn test_pdb_scenarios() {
    let blocked = PdbInfo {
        name: "tight".to_string(),
        namespace: "prod".to_string(),
        selector: BTreeMap::new(),
        min_available: Some(BudgetValue::Count(3)),
        max_unavailable: None,
        current_healthy: 3,
        desired_healthy: 3,
        disruptions_allowed: 0,
        expected_pods: 3,
    };
    let roomy = PdbInfo {
        name: "roomy".to_string(),
        namespace: "prod".to_string(),
        selector: BTreeMap::new(),
        min_available: Some(BudgetValue::Count(2)),
        max_unavailable: None,
        current_healthy: 4,
        desired_healthy: 4,
        disruptions_allowed: 2,
        expected_pods: 4,
    };

    let blockers = evaluate_blockers(&[blocked, roomy]);
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].name, "tight");
    assert!(blockers[0].block_reason.contains("minAvailable=3"));
    assert!(blockers[0].block_reason.contains("(3)"));
}

#[test]
fn test_oomkilled_previous_run_is_runtime_and_unhealthy() {
    // Currently Running, previous run OOM killed: restart churn is the signal.
    let pod = PodInfo {
        name: "api-1".to_string(),
        namespace: "prod".to_string(),
        phase: PodPhase::Running,
        node_name: Some("node-1".to_string()),
        labels: BTreeMap::new(),
        reason: None,
        message: None,
        containers: vec![ContainerInfo {
            name: "app".to_string(),
            ready: true,
            restart_count: 4,
            state: ContainerState::Running,
            last_terminated_reason: Some("OOMKilled".to_string()),
            last_terminated_exit_code: Some(137),
        }],
    };

    assert!(is_unhealthy(&pod));
    assert_eq!(
        categorize_failure(pod.reason.as_deref(), &pod.containers),
        FailureCategory::Runtime
    );
}

fn upgrade_event(reason: &str, node_name: &str, minutes_ago: i64, now: DateTime<Utc>) -> EventInfo {
    EventInfo {
        reason: reason.to_string(),
        kind: "Node".to_string(),
        name: node_name.to_string(),
        namespace: None,
        message: String::new(),
        count: 1,
        timestamp: Some(now - Duration::minutes(minutes_ago)),
    }
}

#[test]
fn test_upgrade_wave_end_to_end() {
    let now = Utc::now();
    let mut done = node("node-1", "nodepool1", "4000m", true);
    done.kubelet_version = "v1.29.0".to_string();
    let mut in_flight = node("node-2", "nodepool1", "4000m", false);
    in_flight.unschedulable = true;
    let waiting = node("node-3", "nodepool1", "4000m", true);

    let events = vec![
        upgrade_event("NodeUpgrade", "node-1", 40, now),
        upgrade_event("NodeReady", "node-1", 25, now),
        upgrade_event("NodeUpgrade", "node-2", 15, now),
    ];

    // No cloud metadata: terminal check degrades to event evidence.
    let (response, active) = progress_from_parts(
        "prod-weu".to_string(),
        None,
        &[done, in_flight, waiting],
        &events,
        &[],
        None,
        now,
        &Thresholds::default(),
        Vec::new(),
    );

    let states: BTreeMap<&str, UpgradeState> = response
        .nodes
        .iter()
        .map(|n| (n.name.as_str(), n.state))
        .collect();
    assert_eq!(states["node-1"], UpgradeState::Upgraded);
    assert_eq!(states["node-2"], UpgradeState::Upgrading);
    assert_eq!(states["node-3"], UpgradeState::Pending);

    // 40 minutes elapsed, one of three complete, two remaining.
    assert_eq!(response.elapsed_seconds, Some(2400));
    assert_eq!(response.estimated_remaining_seconds, Some(4800.0));
    assert!(!response.anomaly);
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_fan_out_isolates_failing_cluster() {
    let targets = vec![target("prod-weu"), target("prod-neu"), target("prod-eus")];
    let results = fan_out("get_pod_health", &targets, |t| async move {
        if t.id == "prod-neu" {
            anyhow::bail!("api server unreachable");
        }
        Ok(t.id.clone())
    })
    .await;

    // Exactly N-1 successes, attributable by id, no placeholder.
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(id, value)| id == value));
    assert!(!results.iter().any(|(id, _)| id == "prod-neu"));
}
