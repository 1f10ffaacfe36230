use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::analysis::pressure::{aggregate_pools, classify_pressure, NodeUsage};
use crate::errors::ToolCallError;
use crate::providers::{CloudClient, ClusterObjects};
use crate::tools::{parse_args, run_for_clusters, ToolContext};
use crate::types::{ClusterTarget, NodeInfo, PodInfo, PressureLevel, Thresholds, ToolError};

#[derive(Debug, Deserialize)]
struct PressureRequest {
    cluster_id: String,
}

#[derive(Debug, Serialize)]
pub struct PoolPressure {
    pub pool: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub pending_pods: i64,
    pub ready_nodes: usize,
    pub total_nodes: usize,
    pub max_nodes: Option<i32>,
    pub pressure_level: PressureLevel,
}

#[derive(Debug, Serialize)]
pub struct PressureResponse {
    pub cluster: String,
    pub pools: Vec<PoolPressure>,
    pub summary: String,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: PressureRequest = parse_args(args)?;
    let thresholds = ctx.thresholds.clone();
    run_for_clusters(ctx, &request.cluster_id, "check_node_pool_pressure", |target| {
        let thresholds = thresholds.clone();
        async move { Ok(check_cluster(target, &thresholds).await) }
    })
    .await
}

async fn check_cluster(target: ClusterTarget, thresholds: &Thresholds) -> PressureResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();

    let objects = match ClusterObjects::connect(&target.kube_context).await {
        Ok(objects) => objects,
        Err(e) => {
            errors.push(ToolError::partial("kubernetes", &cluster, &e));
            return unreachable_response(cluster, errors);
        }
    };

    // The node list is foundational: nothing below can be computed without it.
    let nodes = match objects.list_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            errors.push(ToolError::partial("nodes", &cluster, &e));
            return unreachable_response(cluster, errors);
        }
    };

    // Independent failure domains, fetched concurrently and caught separately.
    let cloud = CloudClient::new(target.clone());
    let (metrics_result, pods_result, info_result) = tokio::join!(
        objects.list_node_metrics(),
        objects.list_pods(None, Some("status.phase=Pending")),
        cloud.get_cluster_info(),
    );

    let metrics = match metrics_result {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            errors.push(ToolError::partial("metrics", &cluster, &e));
            None
        }
    };
    let pending_pods = match pods_result {
        Ok(pods) => pods,
        Err(e) => {
            errors.push(ToolError::partial("pods", &cluster, &e));
            Vec::new()
        }
    };
    let max_nodes_by_pool = match info_result {
        Ok(info) => info
            .pools
            .iter()
            .map(|p| (p.name.clone(), p.max_count.unwrap_or(p.count)))
            .collect(),
        Err(e) => {
            errors.push(ToolError::partial("cloud", &cluster, &e));
            BTreeMap::new()
        }
    };

    pressure_from_parts(
        cluster,
        &nodes,
        metrics.as_ref(),
        &pending_pods,
        &max_nodes_by_pool,
        thresholds,
        errors,
    )
}

fn unreachable_response(cluster: String, errors: Vec<ToolError>) -> PressureResponse {
    PressureResponse {
        cluster,
        pools: Vec::new(),
        summary: "unknown (cluster unreachable)".to_string(),
        errors,
    }
}

/// Pure assembly over already-fetched data.
pub fn pressure_from_parts(
    cluster: String,
    nodes: &[NodeInfo],
    metrics: Option<&HashMap<String, NodeUsage>>,
    pods: &[PodInfo],
    max_nodes_by_pool: &BTreeMap<String, i32>,
    thresholds: &Thresholds,
    errors: Vec<ToolError>,
) -> PressureResponse {
    let stats = aggregate_pools(nodes, metrics, pods);

    let pools: Vec<PoolPressure> = stats
        .into_iter()
        .map(|(pool, stats)| {
            let cpu_percent = stats.cpu_percent();
            let memory_percent = stats.memory_percent();
            let pressure_level =
                classify_pressure(cpu_percent, memory_percent, stats.pending_pods, thresholds);
            PoolPressure {
                max_nodes: max_nodes_by_pool.get(&pool).copied(),
                pool,
                cpu_percent,
                memory_percent,
                pending_pods: stats.pending_pods,
                ready_nodes: stats.ready_nodes,
                total_nodes: stats.total_nodes,
                pressure_level,
            }
        })
        .collect();

    let critical = pools.iter().filter(|p| p.pressure_level == PressureLevel::Critical).count();
    let warning = pools.iter().filter(|p| p.pressure_level == PressureLevel::Warning).count();
    let summary = format!(
        "{} pools: {} critical, {} warning, {} ok",
        pools.len(),
        critical,
        warning,
        pools.len() - critical - warning
    );

    PressureResponse { cluster, pools, summary, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn usage(cpu: &str, memory: &str) -> NodeUsage {
        NodeUsage { cpu: cpu.to_string(), memory: memory.to_string() }
    }

    #[test]
    fn test_two_node_pool_is_ok_at_62_percent() {
        let nodes = vec![
            node("node-1", "nodepool1", "4000m", true),
            node("node-2", "nodepool1", "4000m", true),
        ];
        let mut metrics = HashMap::new();
        metrics.insert("node-1".to_string(), usage("3000m", "4Gi"));
        metrics.insert("node-2".to_string(), usage("2000m", "4Gi"));

        let response = pressure_from_parts(
            "prod-weu".to_string(),
            &nodes,
            Some(&metrics),
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            Vec::new(),
        );

        let pool = &response.pools[0];
        assert_eq!(pool.cpu_percent, Some(62.5));
        assert_eq!(pool.pressure_level, PressureLevel::Ok);
        assert_eq!(pool.ready_nodes, 2);
        assert_eq!(response.summary, "1 pools: 0 critical, 0 warning, 1 ok");
    }

    #[test]
    fn test_single_node_pool_critical_at_95_percent() {
        let nodes = vec![node("node-1", "nodepool1", "4000m", true)];
        let mut metrics = HashMap::new();
        metrics.insert("node-1".to_string(), usage("3800m", "1Gi"));

        let response = pressure_from_parts(
            "prod-weu".to_string(),
            &nodes,
            Some(&metrics),
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            Vec::new(),
        );

        let pool = &response.pools[0];
        assert_eq!(pool.cpu_percent, Some(95.0));
        assert_eq!(pool.pressure_level, PressureLevel::Critical);
    }

    #[test]
    fn test_missing_metrics_degrade_to_null_percentages() {
        let nodes = vec![node("node-1", "nodepool1", "4000m", true)];
        let errors = vec![ToolError::partial("metrics", "prod-weu", "metrics api down")];

        let response = pressure_from_parts(
            "prod-weu".to_string(),
            &nodes,
            None,
            &[],
            &BTreeMap::new(),
            &Thresholds::default(),
            errors,
        );

        let pool = &response.pools[0];
        assert_eq!(pool.cpu_percent, None);
        assert_eq!(pool.memory_percent, None);
        assert_eq!(pool.pressure_level, PressureLevel::Ok);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].partial_data);
    }

    #[test]
    fn test_max_nodes_attached_from_cloud_state() {
        let nodes = vec![node("node-1", "nodepool1", "4000m", true)];
        let mut max_nodes = BTreeMap::new();
        max_nodes.insert("nodepool1".to_string(), 10);

        let response = pressure_from_parts(
            "prod-weu".to_string(),
            &nodes,
            None,
            &[],
            &max_nodes,
            &Thresholds::default(),
            Vec::new(),
        );
        assert_eq!(response.pools[0].max_nodes, Some(10));
    }
}
