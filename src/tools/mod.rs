// One module per exposed operation. Each splits a thin async fetch layer
// from a pure assembly function so the composition logic tests without a
// cluster.
pub mod pdb_risk;
pub mod pod_health;
pub mod pressure;
pub mod upgrade_metrics;
pub mod upgrade_progress;
pub mod upgrade_status;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::config::ClusterRegistry;
use crate::errors::ToolCallError;
use crate::fanout::fan_out;
use crate::scrub::scrub_text;
use crate::types::{ClusterTarget, Thresholds};

/// Immutable per-process state handed to every request.
pub struct ToolContext {
    pub registry: ClusterRegistry,
    pub thresholds: Thresholds,
}

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("namespace pattern"));
static NODE_POOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]{0,11}$").expect("node pool pattern"));

pub fn validate_namespace(namespace: &str) -> Result<(), ToolCallError> {
    if NAMESPACE_RE.is_match(namespace) {
        Ok(())
    } else {
        Err(ToolCallError::invalid(
            "namespace",
            format!("'{namespace}' is not a DNS label"),
        ))
    }
}

pub fn validate_node_pool(pool: &str) -> Result<(), ToolCallError> {
    if NODE_POOL_RE.is_match(pool) {
        Ok(())
    } else {
        Err(ToolCallError::invalid(
            "node_pool",
            format!("'{pool}' must be lowercase alphanumeric and start with a letter"),
        ))
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolCallError> {
    serde_json::from_value(args).map_err(|e| ToolCallError::invalid("args", e.to_string()))
}

#[derive(Debug, Serialize)]
pub struct FleetResponse<T: Serialize> {
    pub clusters: Vec<T>,
}

/// Resolve the cluster id (or "all") and run the single-cluster operation,
/// fanning out concurrently for the fleet case.
pub(crate) async fn run_for_clusters<T, F, Fut>(
    ctx: &ToolContext,
    cluster_id: &str,
    operation: &str,
    run: F,
) -> Result<Value, ToolCallError>
where
    T: Serialize,
    F: Fn(ClusterTarget) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let targets = ctx.registry.resolve_many(cluster_id)?;

    if cluster_id == "all" {
        let results = fan_out(operation, &targets, run).await;
        let clusters: Vec<T> = results.into_iter().map(|(_, response)| response).collect();
        to_value(operation, cluster_id, FleetResponse { clusters })
    } else {
        let target = targets.into_iter().next().ok_or_else(|| ToolCallError::Operation {
            operation: operation.to_string(),
            cluster: cluster_id.to_string(),
            message: "registry resolved no target".to_string(),
        })?;
        let response = run(target).await.map_err(|e| ToolCallError::Operation {
            operation: operation.to_string(),
            cluster: cluster_id.to_string(),
            message: e.to_string(),
        })?;
        to_value(operation, cluster_id, response)
    }
}

fn to_value<T: Serialize>(
    operation: &str,
    cluster_id: &str,
    response: T,
) -> Result<Value, ToolCallError> {
    serde_json::to_value(response).map_err(|e| ToolCallError::Operation {
        operation: operation.to_string(),
        cluster: cluster_id.to_string(),
        message: format!("serializing response: {e}"),
    })
}

pub async fn dispatch(ctx: &ToolContext, tool: &str, args: Value) -> Result<Value, ToolCallError> {
    match tool {
        "check_node_pool_pressure" => pressure::run(ctx, args).await,
        "get_pod_health" => pod_health::run(ctx, args).await,
        "get_kubernetes_upgrade_status" => upgrade_status::run(ctx, args).await,
        "get_upgrade_progress" => upgrade_progress::run(ctx, args).await,
        "get_upgrade_duration_metrics" => upgrade_metrics::run(ctx, args).await,
        "check_pdb_upgrade_risk" => pdb_risk::run(ctx, args).await,
        other => Err(ToolCallError::UnknownTool(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

async fn handle_line(ctx: &ToolContext, line: &str) -> Value {
    match serde_json::from_str::<ToolCall>(line) {
        Ok(call) => {
            info!(tool = %call.tool, "handling tool call");
            match dispatch(ctx, &call.tool, call.args).await {
                Ok(result) => json!({ "tool": call.tool, "result": result }),
                Err(err) => json!({ "tool": call.tool, "error": err.to_string() }),
            }
        }
        Err(err) => json!({ "error": format!("malformed request: {err}") }),
    }
}

/// Newline-delimited JSON over stdin/stdout: one request object per line in,
/// one scrubbed response object per line out. No network listener.
pub async fn serve_stdio(ctx: ToolContext) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = handle_line(&ctx, line).await;
        let text = scrub_text(&reply.to_string());
        stdout.write_all(text.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
