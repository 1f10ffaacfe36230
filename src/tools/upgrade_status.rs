use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::pool_upgrade_active;
use crate::errors::ToolCallError;
use crate::providers::{CloudClient, ClusterInfo, UpgradeProfile};
use crate::tools::{parse_args, run_for_clusters, ToolContext};
use crate::types::{ClusterTarget, ToolError};

#[derive(Debug, Deserialize)]
struct UpgradeStatusRequest {
    cluster_id: String,
}

#[derive(Debug, Serialize)]
pub struct PoolVersionStatus {
    pub name: String,
    pub current_version: Option<String>,
    pub target_version: Option<String>,
    pub provisioning_state: String,
    pub upgrade_active: bool,
}

#[derive(Debug, Serialize)]
pub struct UpgradeStatusResponse {
    pub cluster: String,
    pub control_plane_version: Option<String>,
    pub current_control_plane_version: Option<String>,
    pub provisioning_state: String,
    pub power_state: Option<String>,
    pub pools: Vec<PoolVersionStatus>,
    pub available_upgrades: Vec<String>,
    pub upgrade_active: bool,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: UpgradeStatusRequest = parse_args(args)?;
    run_for_clusters(
        ctx,
        &request.cluster_id,
        "get_kubernetes_upgrade_status",
        |target| async move { Ok(check_cluster(target).await) },
    )
    .await
}

async fn check_cluster(target: ClusterTarget) -> UpgradeStatusResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();
    let cloud = CloudClient::new(target);

    // Independent failure domains: a broken upgrade-profile endpoint must
    // not suppress the cluster metadata, and vice versa.
    let (info_result, profile_result) =
        tokio::join!(cloud.get_cluster_info(), cloud.get_upgrade_profile());

    let info = match info_result {
        Ok(info) => Some(info),
        Err(e) => {
            errors.push(ToolError::partial("cloud", &cluster, &e));
            None
        }
    };
    let profile = match profile_result {
        Ok(profile) => Some(profile),
        Err(e) => {
            errors.push(ToolError::partial("upgrade-profile", &cluster, &e));
            None
        }
    };

    status_from_parts(cluster, info.as_ref(), profile.as_ref(), errors)
}

/// Pure assembly over already-fetched data. Cluster metadata is the
/// foundation: without it the response is an "unknown" placeholder carrying
/// the recorded error.
pub fn status_from_parts(
    cluster: String,
    info: Option<&ClusterInfo>,
    profile: Option<&UpgradeProfile>,
    errors: Vec<ToolError>,
) -> UpgradeStatusResponse {
    let Some(info) = info else {
        return UpgradeStatusResponse {
            cluster,
            control_plane_version: None,
            current_control_plane_version: None,
            provisioning_state: "unknown".to_string(),
            power_state: None,
            pools: Vec::new(),
            available_upgrades: Vec::new(),
            upgrade_active: false,
            errors,
        };
    };

    let pools: Vec<PoolVersionStatus> = info
        .pools
        .iter()
        .map(|pool| PoolVersionStatus {
            name: pool.name.clone(),
            current_version: pool.current_version.clone(),
            target_version: pool.target_version.clone(),
            provisioning_state: pool.provisioning_state.clone(),
            upgrade_active: pool_upgrade_active(
                &pool.provisioning_state,
                pool.current_version.as_deref(),
                pool.target_version.as_deref(),
            ),
        })
        .collect();

    let upgrade_active = info.provisioning_state == "Upgrading"
        || pools.iter().any(|p| p.upgrade_active)
        || pool_upgrade_active(
            &info.provisioning_state,
            info.current_kubernetes_version.as_deref(),
            info.kubernetes_version.as_deref(),
        );

    UpgradeStatusResponse {
        cluster,
        control_plane_version: info.kubernetes_version.clone(),
        current_control_plane_version: info.current_kubernetes_version.clone(),
        provisioning_state: info.provisioning_state.clone(),
        power_state: info.power_state.clone(),
        pools,
        available_upgrades: profile
            .map(|p| p.control_plane_upgrades.clone())
            .unwrap_or_default(),
        upgrade_active,
        errors,
    }
}
