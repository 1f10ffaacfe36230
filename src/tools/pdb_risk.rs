use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::analysis::{evaluate_blockers, PdbBlocker};
use crate::errors::ToolCallError;
use crate::providers::ClusterObjects;
use crate::tools::{parse_args, run_for_clusters, validate_node_pool, ToolContext};
use crate::types::{ClusterTarget, NodeInfo, PdbInfo, PodInfo, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    /// Budget arithmetic only: which PDBs would block a drain.
    Preflight,
    /// Additionally resolve which nodes host pods covered by each blocker.
    Live,
}

#[derive(Debug, Deserialize)]
struct PdbRiskRequest {
    cluster_id: String,
    node_pool: Option<String>,
    mode: RiskMode,
}

#[derive(Debug, Serialize)]
pub struct PdbRiskResponse {
    pub cluster: String,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_pool: Option<String>,
    pub blocking_pdbs: Vec<PdbBlocker>,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: PdbRiskRequest = parse_args(args)?;
    if let Some(pool) = request.node_pool.as_deref() {
        validate_node_pool(pool)?;
    }
    let node_pool = request.node_pool.clone();
    let mode = request.mode;

    run_for_clusters(ctx, &request.cluster_id, "check_pdb_upgrade_risk", |target| {
        let node_pool = node_pool.clone();
        async move { Ok(check_cluster(target, node_pool, mode).await) }
    })
    .await
}

fn mode_str(mode: RiskMode) -> &'static str {
    match mode {
        RiskMode::Preflight => "preflight",
        RiskMode::Live => "live",
    }
}

async fn check_cluster(
    target: ClusterTarget,
    node_pool: Option<String>,
    mode: RiskMode,
) -> PdbRiskResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();

    let objects = match ClusterObjects::connect(&target.kube_context).await {
        Ok(objects) => objects,
        Err(e) => {
            errors.push(ToolError::partial("kubernetes", &cluster, &e));
            return PdbRiskResponse {
                cluster,
                mode: mode_str(mode),
                node_pool,
                blocking_pdbs: Vec::new(),
                errors,
            };
        }
    };

    // The budget list is foundational for both modes.
    let pdbs = match objects.list_pdbs(None).await {
        Ok(pdbs) => pdbs,
        Err(e) => {
            errors.push(ToolError::partial("pdb", &cluster, &e));
            return PdbRiskResponse {
                cluster,
                mode: mode_str(mode),
                node_pool,
                blocking_pdbs: Vec::new(),
                errors,
            };
        }
    };

    let mut blockers = evaluate_blockers(&pdbs);

    if mode == RiskMode::Live && !blockers.is_empty() {
        // Pods and nodes only refine the picture; either failing leaves the
        // blocker list itself intact.
        let (pods_result, nodes_result) =
            tokio::join!(objects.list_pods(None, None), objects.list_nodes());
        match (pods_result, nodes_result) {
            (Ok(pods), Ok(nodes)) => {
                attach_affected_nodes(&mut blockers, &pdbs, &pods, &nodes, node_pool.as_deref());
            }
            (pods_result, nodes_result) => {
                if let Err(e) = pods_result {
                    errors.push(ToolError::partial("pods", &cluster, &e));
                }
                if let Err(e) = nodes_result {
                    errors.push(ToolError::partial("nodes", &cluster, &e));
                }
            }
        }
    }

    PdbRiskResponse {
        cluster,
        mode: mode_str(mode),
        node_pool,
        blocking_pdbs: blockers,
        errors,
    }
}

fn selector_matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(key, value)| labels.get(key) == Some(value))
}

/// Resolve which nodes host pods covered by each blocking budget, optionally
/// restricted to one pool. An empty selector covers every pod in the
/// budget's namespace, matching the API server's semantics.
pub fn attach_affected_nodes(
    blockers: &mut [PdbBlocker],
    pdbs: &[PdbInfo],
    pods: &[PodInfo],
    nodes: &[NodeInfo],
    node_pool: Option<&str>,
) {
    let pool_of: BTreeMap<&str, Option<&str>> = nodes
        .iter()
        .map(|n| (n.name.as_str(), n.pool.as_deref()))
        .collect();

    for blocker in blockers.iter_mut() {
        let Some(pdb) = pdbs
            .iter()
            .find(|p| p.name == blocker.name && p.namespace == blocker.namespace)
        else {
            continue;
        };

        let mut affected: Vec<String> = pods
            .iter()
            .filter(|pod| pod.namespace == pdb.namespace)
            .filter(|pod| selector_matches(&pdb.selector, &pod.labels))
            .filter_map(|pod| pod.node_name.clone())
            .filter(|node_name| match node_pool {
                Some(pool) => pool_of.get(node_name.as_str()) == Some(&Some(pool)),
                None => true,
            })
            .collect();
        affected.sort();
        affected.dedup();
        blocker.affected_nodes = affected;
    }
}
