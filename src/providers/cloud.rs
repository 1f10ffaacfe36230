use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::errors::ProviderError;
use crate::types::ClusterTarget;

const CONTAINER_SERVICE_API_VERSION: &str = "2024-02-01";
const ACTIVITY_LOG_API_VERSION: &str = "2015-04-01";
const ACTIVITY_LOG_WINDOW_DAYS: i64 = 90;
pub const ACTIVITY_LOG_MAX_RECORDS: usize = 50;

/// Management-plane view of one node pool.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub name: String,
    pub count: i32,
    pub max_count: Option<i32>,
    pub current_version: Option<String>,
    pub target_version: Option<String>,
    pub provisioning_state: String,
    pub vm_size: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub name: String,
    pub kubernetes_version: Option<String>,
    pub current_kubernetes_version: Option<String>,
    pub provisioning_state: String,
    pub power_state: Option<String>,
    pub pools: Vec<PoolState>,
}

#[derive(Debug, Clone)]
pub struct PoolUpgradeProfile {
    pub name: String,
    pub current_version: Option<String>,
    pub upgrades: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpgradeProfile {
    pub control_plane_version: Option<String>,
    pub control_plane_upgrades: Vec<String>,
    pub pools: Vec<PoolUpgradeProfile>,
}

/// One completed management-plane upgrade operation from the audit trail.
#[derive(Debug, Clone)]
pub struct UpgradeRecord {
    pub operation: String,
    pub status: String,
    pub submission_timestamp: DateTime<Utc>,
    pub event_timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Client for the cloud provider's management REST surface.
///
/// The bearer token is created on first use and cached under a mutex; the
/// token path never calls back into another accessor on this struct, so the
/// non-reentrant lock cannot deadlock.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    target: ClusterTarget,
    token: Mutex<Option<String>>,
}

impl CloudClient {
    pub fn new(target: ClusterTarget) -> Self {
        Self::with_base_url(target, "https://management.azure.com")
    }

    pub fn with_base_url(target: ClusterTarget, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            target,
            token: Mutex::new(None),
        }
    }

    /// Pre-seed the credential; used by tests and by callers that already
    /// hold a token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Mutex::new(Some(token.into()));
        self
    }

    async fn bearer_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = std::env::var("AZURE_MGMT_TOKEN").map_err(|_| {
            ProviderError::Credential("AZURE_MGMT_TOKEN is not set".to_string())
        })?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let token = self.bearer_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    fn cluster_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
            self.target.subscription_id, self.target.resource_group, self.target.cluster_name
        )
    }

    pub async fn get_cluster_info(&self) -> Result<ClusterInfo, ProviderError> {
        let raw: RawManagedCluster = self
            .get_json(
                &self.cluster_path(),
                &[("api-version", CONTAINER_SERVICE_API_VERSION)],
            )
            .await?;
        Ok(cluster_info_from_raw(raw))
    }

    pub async fn get_node_pool_state(&self, pool: &str) -> Result<PoolState, ProviderError> {
        let path = format!("{}/agentPools/{}", self.cluster_path(), pool);
        let raw: RawAgentPool = self
            .get_json(&path, &[("api-version", CONTAINER_SERVICE_API_VERSION)])
            .await?;
        Ok(pool_state_from_raw(raw))
    }

    pub async fn get_upgrade_profile(&self) -> Result<UpgradeProfile, ProviderError> {
        let path = format!("{}/upgradeProfiles/default", self.cluster_path());
        let raw: RawUpgradeProfile = self
            .get_json(&path, &[("api-version", CONTAINER_SERVICE_API_VERSION)])
            .await?;
        Ok(upgrade_profile_from_raw(raw))
    }

    /// Completed upgrade operations for this cluster from the activity log,
    /// newest first, within the provider's 90-day retention window.
    pub async fn get_activity_log_upgrades(
        &self,
        count: usize,
    ) -> Result<Vec<UpgradeRecord>, ProviderError> {
        let count = count.clamp(1, ACTIVITY_LOG_MAX_RECORDS);
        let from = Utc::now() - Duration::days(ACTIVITY_LOG_WINDOW_DAYS);
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Insights/eventtypes/management/values",
            self.target.subscription_id
        );
        let filter = format!(
            "eventTimestamp ge '{}' and resourceGroupName eq '{}'",
            from.to_rfc3339(),
            self.target.resource_group
        );
        let raw: RawActivityLog = self
            .get_json(
                &path,
                &[("api-version", ACTIVITY_LOG_API_VERSION), ("$filter", &filter)],
            )
            .await?;

        Ok(upgrade_records_from_raw(raw, &self.target.cluster_name, count))
    }
}

// Wire formats. Only this boundary touches the loosely-typed shape; the
// conversion functions below produce the typed records everything else uses.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManagedCluster {
    #[serde(default)]
    name: String,
    properties: RawManagedClusterProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManagedClusterProperties {
    kubernetes_version: Option<String>,
    current_kubernetes_version: Option<String>,
    #[serde(default)]
    provisioning_state: String,
    power_state: Option<RawPowerState>,
    #[serde(default)]
    agent_pool_profiles: Vec<RawAgentPoolProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPowerState {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAgentPool {
    #[serde(default)]
    name: String,
    properties: RawAgentPoolProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawAgentPoolProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    count: i32,
    max_count: Option<i32>,
    orchestrator_version: Option<String>,
    current_orchestrator_version: Option<String>,
    #[serde(default)]
    provisioning_state: String,
    vm_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpgradeProfile {
    properties: RawUpgradeProfileProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpgradeProfileProperties {
    control_plane_profile: Option<RawPoolUpgradeProfile>,
    #[serde(default)]
    agent_pool_profiles: Vec<RawPoolUpgradeProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoolUpgradeProfile {
    #[serde(default)]
    name: Option<String>,
    kubernetes_version: Option<String>,
    #[serde(default)]
    upgrades: Vec<RawUpgradeOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpgradeOption {
    kubernetes_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawActivityLog {
    #[serde(default)]
    value: Vec<RawActivityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivityEntry {
    operation_name: Option<RawLocalizedValue>,
    status: Option<RawLocalizedValue>,
    event_timestamp: Option<DateTime<Utc>>,
    submission_timestamp: Option<DateTime<Utc>>,
    resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocalizedValue {
    value: Option<String>,
}

fn pool_state_from_properties(name: String, p: RawAgentPoolProperties) -> PoolState {
    PoolState {
        name,
        count: p.count,
        max_count: p.max_count,
        current_version: p.current_orchestrator_version.clone().or_else(|| p.orchestrator_version.clone()),
        target_version: p.orchestrator_version,
        provisioning_state: p.provisioning_state,
        vm_size: p.vm_size,
    }
}

fn pool_state_from_raw(raw: RawAgentPool) -> PoolState {
    let name = raw.name.clone();
    pool_state_from_properties(name, raw.properties)
}

fn cluster_info_from_raw(raw: RawManagedCluster) -> ClusterInfo {
    let properties = raw.properties;
    let pools = properties
        .agent_pool_profiles
        .into_iter()
        .map(|p| {
            let name = p.name.clone().unwrap_or_default();
            pool_state_from_properties(name, p)
        })
        .collect();

    ClusterInfo {
        name: raw.name,
        kubernetes_version: properties.kubernetes_version,
        current_kubernetes_version: properties.current_kubernetes_version,
        provisioning_state: properties.provisioning_state,
        power_state: properties.power_state.and_then(|p| p.code),
        pools,
    }
}

fn upgrade_profile_from_raw(raw: RawUpgradeProfile) -> UpgradeProfile {
    let upgrades_of = |profile: &RawPoolUpgradeProfile| -> Vec<String> {
        profile
            .upgrades
            .iter()
            .filter_map(|u| u.kubernetes_version.clone())
            .collect()
    };

    let control_plane = raw.properties.control_plane_profile.as_ref();
    UpgradeProfile {
        control_plane_version: control_plane.and_then(|p| p.kubernetes_version.clone()),
        control_plane_upgrades: control_plane.map(upgrades_of).unwrap_or_default(),
        pools: raw
            .properties
            .agent_pool_profiles
            .iter()
            .map(|p| PoolUpgradeProfile {
                name: p.name.clone().unwrap_or_default(),
                current_version: p.kubernetes_version.clone(),
                upgrades: upgrades_of(p),
            })
            .collect(),
    }
}

fn upgrade_records_from_raw(
    raw: RawActivityLog,
    cluster_name: &str,
    count: usize,
) -> Vec<UpgradeRecord> {
    raw.value
        .into_iter()
        .filter_map(|entry| {
            let operation = entry.operation_name.and_then(|v| v.value)?;
            if !operation.contains("Microsoft.ContainerService/managedClusters") {
                return None;
            }
            let status = entry.status.and_then(|v| v.value)?;
            if status != "Succeeded" {
                return None;
            }
            let resource_id = entry.resource_id.unwrap_or_default();
            if !resource_id.contains(cluster_name) {
                return None;
            }
            let submitted = entry.submission_timestamp?;
            let finished = entry.event_timestamp?;
            Some(UpgradeRecord {
                operation,
                status,
                submission_timestamp: submitted,
                event_timestamp: finished,
                duration_seconds: (finished - submitted).num_milliseconds() as f64 / 1000.0,
            })
        })
        .take(count)
        .collect()
}
