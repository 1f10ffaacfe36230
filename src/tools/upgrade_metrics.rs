use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::upgrade::{
    classify_node, estimate_duration, upgrade_events_for_node, upgrade_wave_start,
    UPGRADE_EVENT_REASONS,
};
use crate::errors::ToolCallError;
use crate::providers::{CloudClient, ClusterObjects, UpgradeRecord};
use crate::tools::{parse_args, run_for_clusters, validate_node_pool, ToolContext};
use crate::types::{ClusterTarget, EventInfo, NodeInfo, Thresholds, ToolError, UpgradeState};

const DEFAULT_HISTORY_COUNT: usize = 10;

#[derive(Debug, Deserialize)]
struct UpgradeMetricsRequest {
    cluster_id: String,
    node_pool: String,
    history_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CurrentRun {
    pub nodes_total: usize,
    pub nodes_completed: usize,
    pub elapsed_seconds: Option<i64>,
    pub mean_seconds_per_node: Option<f64>,
    pub estimated_remaining_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct HistoricalUpgrade {
    pub operation: String,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct DurationStats {
    pub mean_seconds: f64,
    pub p90_seconds: f64,
    /// Share of historical runs that finished within the anomaly baseline.
    pub baseline_compliance_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct UpgradeMetricsResponse {
    pub cluster: String,
    pub node_pool: String,
    pub current_run: Option<CurrentRun>,
    pub history: Vec<HistoricalUpgrade>,
    pub stats: Option<DurationStats>,
    pub anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_message: Option<String>,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: UpgradeMetricsRequest = parse_args(args)?;
    validate_node_pool(&request.node_pool)?;
    let history_count = request.history_count.unwrap_or(DEFAULT_HISTORY_COUNT);
    if !(1..=50).contains(&history_count) {
        return Err(ToolCallError::invalid(
            "history_count",
            format!("{history_count} is outside 1..=50"),
        ));
    }
    let thresholds = ctx.thresholds.clone();
    let node_pool = request.node_pool.clone();

    run_for_clusters(
        ctx,
        &request.cluster_id,
        "get_upgrade_duration_metrics",
        |target| {
            let thresholds = thresholds.clone();
            let node_pool = node_pool.clone();
            async move { Ok(check_cluster(target, node_pool, history_count, &thresholds).await) }
        },
    )
    .await
}

async fn check_cluster(
    target: ClusterTarget,
    node_pool: String,
    history_count: usize,
    thresholds: &Thresholds,
) -> UpgradeMetricsResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();
    let cloud = CloudClient::new(target.clone());

    // The live cluster view and the audit trail are independent failure
    // domains: history is still meaningful when the cluster is unreachable,
    // and vice versa.
    let (current_nodes, current_events) = match ClusterObjects::connect(&target.kube_context).await
    {
        Ok(objects) => {
            let (nodes_result, events_result) = tokio::join!(
                objects.list_nodes(),
                objects.list_node_events(Some(UPGRADE_EVENT_REASONS)),
            );
            let nodes = match nodes_result {
                Ok(nodes) => Some(nodes),
                Err(e) => {
                    errors.push(ToolError::partial("nodes", &cluster, &e));
                    None
                }
            };
            let events = match events_result {
                Ok(events) => events,
                Err(e) => {
                    errors.push(ToolError::partial("events", &cluster, &e));
                    Vec::new()
                }
            };
            (nodes, events)
        }
        Err(e) => {
            errors.push(ToolError::partial("kubernetes", &cluster, &e));
            (None, Vec::new())
        }
    };

    let (pool_state_result, history_result) = tokio::join!(
        cloud.get_node_pool_state(&node_pool),
        cloud.get_activity_log_upgrades(history_count),
    );
    let target_version = match pool_state_result {
        Ok(state) => state.target_version,
        Err(e) => {
            errors.push(ToolError::partial("cloud", &cluster, &e));
            None
        }
    };
    let history = match history_result {
        Ok(records) => records,
        Err(e) => {
            errors.push(ToolError::partial("activity-log", &cluster, &e));
            Vec::new()
        }
    };

    metrics_from_parts(
        cluster,
        node_pool,
        current_nodes.as_deref(),
        &current_events,
        target_version.as_deref(),
        &history,
        Utc::now(),
        thresholds,
        errors,
    )
}

/// Pure assembly over already-fetched data.
#[allow(clippy::too_many_arguments)]
pub fn metrics_from_parts(
    cluster: String,
    node_pool: String,
    nodes: Option<&[NodeInfo]>,
    events: &[EventInfo],
    target_version: Option<&str>,
    history: &[UpgradeRecord],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    errors: Vec<ToolError>,
) -> UpgradeMetricsResponse {
    let current_run = nodes.and_then(|nodes| {
        current_run_for_pool(nodes, events, &node_pool, target_version, now, thresholds)
    });

    let durations: Vec<f64> = history.iter().map(|r| r.duration_seconds).collect();
    let stats = duration_stats(&durations, thresholds.upgrade_anomaly_minutes);

    let baseline_seconds = thresholds.upgrade_anomaly_minutes * 60;
    let (anomaly, anomaly_message) = match current_run
        .as_ref()
        .and_then(|run| run.elapsed_seconds)
    {
        Some(elapsed) if elapsed > baseline_seconds => (
            true,
            Some(format!(
                "current run at {}m exceeds the {}m baseline",
                elapsed / 60,
                thresholds.upgrade_anomaly_minutes
            )),
        ),
        _ => (false, None),
    };

    UpgradeMetricsResponse {
        cluster,
        node_pool,
        current_run,
        history: history
            .iter()
            .map(|record| HistoricalUpgrade {
                operation: record.operation.clone(),
                completed_at: record.event_timestamp,
                duration_seconds: record.duration_seconds,
            })
            .collect(),
        stats,
        anomaly,
        anomaly_message,
        errors,
    }
}

fn current_run_for_pool(
    nodes: &[NodeInfo],
    events: &[EventInfo],
    node_pool: &str,
    target_version: Option<&str>,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Option<CurrentRun> {
    let pool_nodes: Vec<&NodeInfo> = nodes
        .iter()
        .filter(|n| n.pool.as_deref() == Some(node_pool))
        .collect();
    if pool_nodes.is_empty() {
        return None;
    }

    let pool_events: Vec<EventInfo> = pool_nodes
        .iter()
        .flat_map(|n| upgrade_events_for_node(events, &n.name))
        .cloned()
        .collect();
    let wave_start = upgrade_wave_start(&pool_events)?;

    let states: Vec<UpgradeState> = pool_nodes
        .iter()
        .map(|node| {
            let node_events = upgrade_events_for_node(events, &node.name);
            classify_node(
                node,
                target_version,
                &node_events,
                false,
                Some(wave_start),
                now,
                thresholds.upgrade_anomaly_minutes,
            )
        })
        .collect();

    let estimate = estimate_duration(&states, Some(wave_start), now, thresholds.upgrade_anomaly_minutes);
    let completed = states.iter().filter(|s| **s == UpgradeState::Upgraded).count();

    Some(CurrentRun {
        nodes_total: pool_nodes.len(),
        nodes_completed: completed,
        elapsed_seconds: estimate.elapsed_seconds,
        mean_seconds_per_node: estimate.mean_seconds_per_node,
        estimated_remaining_seconds: estimate.estimated_remaining_seconds,
    })
}

/// Mean, p90 and baseline compliance over historical durations.
pub fn duration_stats(durations: &[f64], anomaly_minutes: i64) -> Option<DurationStats> {
    if durations.is_empty() {
        return None;
    }
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index = ((sorted.len() as f64) * 0.9).ceil() as usize;
    let p90 = sorted[index.saturating_sub(1).min(sorted.len() - 1)];

    let baseline = (anomaly_minutes * 60) as f64;
    let within = durations.iter().filter(|d| **d <= baseline).count();
    let compliance = within as f64 / durations.len() as f64 * 100.0;

    Some(DurationStats {
        mean_seconds: mean,
        p90_seconds: p90,
        baseline_compliance_percent: compliance,
    })
}
