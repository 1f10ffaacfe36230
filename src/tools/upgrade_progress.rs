use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::analysis::upgrade::{
    classify_node, estimate_duration, summarize_pod_transitions, upgrade_events_for_node,
    upgrade_wave_start, PodTransitionSummary, UPGRADE_EVENT_REASONS,
};
use crate::analysis::{evaluate_blockers, PdbBlocker};
use crate::errors::ToolCallError;
use crate::providers::{CloudClient, ClusterInfo, ClusterObjects};
use crate::tools::{parse_args, run_for_clusters, validate_node_pool, ToolContext};
use crate::types::{
    ClusterTarget, EventInfo, NodeInfo, PdbInfo, Thresholds, ToolError, UpgradeState,
};

#[derive(Debug, Deserialize)]
struct UpgradeProgressRequest {
    cluster_id: String,
    node_pool: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeProgress {
    pub name: String,
    pub pool: Option<String>,
    pub state: UpgradeState,
    pub kubelet_version: String,
}

#[derive(Debug, Serialize)]
pub struct UpgradeProgressResponse {
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_pool: Option<String>,
    pub nodes: Vec<NodeProgress>,
    pub elapsed_seconds: Option<i64>,
    pub estimated_remaining_seconds: Option<f64>,
    pub anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_transitions: Option<PodTransitionSummary>,
    pub blocking_pdbs: Vec<PdbBlocker>,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: UpgradeProgressRequest = parse_args(args)?;
    if let Some(pool) = request.node_pool.as_deref() {
        validate_node_pool(pool)?;
    }
    let thresholds = ctx.thresholds.clone();
    let node_pool = request.node_pool.clone();

    run_for_clusters(ctx, &request.cluster_id, "get_upgrade_progress", |target| {
        let thresholds = thresholds.clone();
        let node_pool = node_pool.clone();
        async move { Ok(check_cluster(target, node_pool, &thresholds).await) }
    })
    .await
}

async fn check_cluster(
    target: ClusterTarget,
    node_pool: Option<String>,
    thresholds: &Thresholds,
) -> UpgradeProgressResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();

    let objects = match ClusterObjects::connect(&target.kube_context).await {
        Ok(objects) => objects,
        Err(e) => {
            errors.push(ToolError::partial("kubernetes", &cluster, &e));
            return empty_response(cluster, node_pool, errors);
        }
    };

    // Node list is foundational for the whole classification.
    let nodes = match objects.list_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            errors.push(ToolError::partial("nodes", &cluster, &e));
            return empty_response(cluster, node_pool, errors);
        }
    };

    // Events, policy and cloud metadata are separate failure domains.
    let cloud = CloudClient::new(target.clone());
    let (events_result, pdbs_result, info_result) = tokio::join!(
        objects.list_node_events(Some(UPGRADE_EVENT_REASONS)),
        objects.list_pdbs(None),
        cloud.get_cluster_info(),
    );

    let events = match events_result {
        Ok(events) => events,
        Err(e) => {
            errors.push(ToolError::partial("events", &cluster, &e));
            Vec::new()
        }
    };
    let pdbs = match pdbs_result {
        Ok(pdbs) => pdbs,
        Err(e) => {
            errors.push(ToolError::partial("pdb", &cluster, &e));
            Vec::new()
        }
    };
    let info = match info_result {
        Ok(info) => Some(info),
        Err(e) => {
            // Classification degrades to event evidence for the terminal
            // state; recorded so the caller knows the basis.
            errors.push(ToolError::partial("cloud", &cluster, &e));
            None
        }
    };

    let computed = progress_from_parts(
        cluster,
        node_pool,
        &nodes,
        &events,
        &pdbs,
        info.as_ref(),
        Utc::now(),
        thresholds,
        errors,
    );
    let (mut response, active_nodes) = computed;

    // The pod fetch is expensive and cannot matter when nothing is active.
    if !active_nodes.is_empty() {
        match objects.list_pods(None, None).await {
            Ok(pods) => {
                response.pod_transitions = Some(summarize_pod_transitions(&pods, &active_nodes));
            }
            Err(e) => {
                let error = ToolError::partial("pods", &response.cluster, &e);
                response.errors.push(error);
            }
        }
    }

    response
}

fn empty_response(
    cluster: String,
    node_pool: Option<String>,
    errors: Vec<ToolError>,
) -> UpgradeProgressResponse {
    UpgradeProgressResponse {
        cluster,
        node_pool,
        nodes: Vec::new(),
        elapsed_seconds: None,
        estimated_remaining_seconds: None,
        anomaly: false,
        anomaly_message: None,
        pod_transitions: None,
        blocking_pdbs: Vec::new(),
        errors,
    }
}

/// Pure assembly over already-fetched data. Returns the response plus the
/// set of nodes in an active state, so the caller can decide whether the
/// pod-transition fetch is worth issuing.
#[allow(clippy::too_many_arguments)]
pub fn progress_from_parts(
    cluster: String,
    node_pool: Option<String>,
    nodes: &[NodeInfo],
    events: &[EventInfo],
    pdbs: &[PdbInfo],
    info: Option<&ClusterInfo>,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    errors: Vec<ToolError>,
) -> (UpgradeProgressResponse, HashSet<String>) {
    let selected: Vec<&NodeInfo> = nodes
        .iter()
        .filter(|n| match node_pool.as_deref() {
            Some(pool) => n.pool.as_deref() == Some(pool),
            None => true,
        })
        .collect();

    // Target version per pool from the management plane; None degrades the
    // terminal check to event evidence.
    let target_by_pool: BTreeMap<String, String> = info
        .map(|i| {
            i.pools
                .iter()
                .filter_map(|p| p.target_version.clone().map(|v| (p.name.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    let blocking_pdbs = evaluate_blockers(pdbs);
    let has_pdb_blocker = !blocking_pdbs.is_empty();

    // Upgrade-wave start per pool: earliest NodeUpgrade event among that
    // pool's nodes.
    let mut wave_by_pool: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    for node in &selected {
        let pool = node.pool.clone().unwrap_or_default();
        let node_events: Vec<EventInfo> = upgrade_events_for_node(events, &node.name)
            .into_iter()
            .cloned()
            .collect();
        if let Some(start) = upgrade_wave_start(&node_events) {
            wave_by_pool
                .entry(pool)
                .and_modify(|existing| {
                    if start < *existing {
                        *existing = start;
                    }
                })
                .or_insert(start);
        }
    }

    let mut progress = Vec::with_capacity(selected.len());
    let mut states = Vec::with_capacity(selected.len());
    let mut active_nodes = HashSet::new();

    for node in &selected {
        let pool = node.pool.clone().unwrap_or_default();
        let node_events = upgrade_events_for_node(events, &node.name);
        let target = target_by_pool.get(&pool).map(String::as_str);
        let wave_start = wave_by_pool.get(&pool).copied();

        let state = classify_node(
            node,
            target,
            &node_events,
            has_pdb_blocker,
            wave_start,
            now,
            thresholds.upgrade_anomaly_minutes,
        );
        if state.is_active() {
            active_nodes.insert(node.name.clone());
        }
        states.push(state);
        progress.push(NodeProgress {
            name: node.name.clone(),
            pool: node.pool.clone(),
            state,
            kubelet_version: node.kubelet_version.clone(),
        });
    }

    let earliest_wave = wave_by_pool.values().min().copied();
    let estimate = estimate_duration(&states, earliest_wave, now, thresholds.upgrade_anomaly_minutes);

    let response = UpgradeProgressResponse {
        cluster,
        node_pool,
        nodes: progress,
        elapsed_seconds: estimate.elapsed_seconds,
        estimated_remaining_seconds: estimate.estimated_remaining_seconds,
        anomaly: estimate.anomaly,
        anomaly_message: estimate.anomaly_message,
        pod_transitions: None,
        blocking_pdbs,
        errors,
    };
    (response, active_nodes)
}
