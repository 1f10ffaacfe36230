use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coordinates of one managed cluster. Loaded once at startup from the
/// registry file and immutable afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClusterTarget {
    pub id: String,
    pub environment: String,
    pub region: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    /// Kubeconfig context used to reach the cluster API. Empty means the
    /// ambient default context.
    #[serde(default)]
    pub kube_context: String,
}

/// Operator-tunable classification boundaries. Immutable per process.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub memory_warning: f64,
    pub memory_critical: f64,
    pub pending_pods_warning: i64,
    pub pending_pods_critical: i64,
    pub upgrade_anomaly_minutes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warning: 75.0,
            cpu_critical: 90.0,
            memory_warning: 80.0,
            memory_critical: 95.0,
            pending_pods_warning: 5,
            pending_pods_critical: 20,
            upgrade_anomaly_minutes: 60,
        }
    }
}

/// Severity of resource pressure. Ordering matters: Critical > Warning > Ok.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Ok,
    Warning,
    Critical,
}

/// Fixed failure taxonomy for unhealthy pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Scheduling,
    Runtime,
    Registry,
    Config,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Scheduling => "scheduling",
            FailureCategory::Runtime => "runtime",
            FailureCategory::Registry => "registry",
            FailureCategory::Config => "config",
            FailureCategory::Unknown => "unknown",
        }
    }
}

/// Per-node position in an in-flight version upgrade. Derived on every
/// query, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    Pending,
    Cordoned,
    Upgrading,
    PdbBlocked,
    Stalled,
    Upgraded,
}

impl UpgradeState {
    /// States in which a node is actively being worked on by the upgrade.
    /// Pending has not started and Upgraded is terminal.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            UpgradeState::Cordoned
                | UpgradeState::Upgrading
                | UpgradeState::PdbBlocked
                | UpgradeState::Stalled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Failed,
    Succeeded,
    Unknown,
}

impl PodPhase {
    pub fn from_str(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Failed" => PodPhase::Failed,
            "Succeeded" => PodPhase::Succeeded,
            _ => PodPhase::Unknown,
        }
    }
}

/// Worker node snapshot, read fresh on every query.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    /// Pool assignment from the primary agentpool label, falling back to the
    /// legacy label, else None.
    pub pool: Option<String>,
    pub unschedulable: bool,
    /// Raw quantity strings as reported; normalized by parsing.rs.
    pub allocatable_cpu: String,
    pub allocatable_memory: String,
    pub ready: bool,
    pub kubelet_version: String,
}

/// Current state of one container.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerState {
    Waiting { reason: Option<String> },
    Terminated { reason: Option<String>, exit_code: i32 },
    Running,
    Unknown,
}

impl ContainerState {
    pub fn waiting_reason(&self) -> Option<&str> {
        match self {
            ContainerState::Waiting { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub state: ContainerState,
    /// Reason of the previous run's termination, if any. OOMKill detection
    /// reads this, not the current state.
    pub last_terminated_reason: Option<String>,
    pub last_terminated_exit_code: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub node_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub containers: Vec<ContainerInfo>,
}

/// A cluster event with its timestamp already resolved by recency priority
/// (last recurrence, else series time, else first observation).
#[derive(Debug, Clone)]
pub struct EventInfo {
    pub reason: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub message: String,
    pub count: i32,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A disruption budget value: integer count, or a percentage kept verbatim
/// when integer parsing fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BudgetValue {
    Count(i64),
    Percent(String),
}

impl BudgetValue {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => BudgetValue::Count(n),
            Err(_) => BudgetValue::Percent(raw.to_string()),
        }
    }
}

impl std::fmt::Display for BudgetValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetValue::Count(n) => write!(f, "{}", n),
            BudgetValue::Percent(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdbInfo {
    pub name: String,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
    pub min_available: Option<BudgetValue>,
    pub max_unavailable: Option<BudgetValue>,
    pub current_healthy: i32,
    pub desired_healthy: i32,
    pub disruptions_allowed: i32,
    pub expected_pods: i32,
}

/// Non-fatal diagnostic carried on every tool response instead of aborting
/// on partial failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolError {
    pub message: String,
    pub source: String,
    pub cluster: String,
    pub partial_data: bool,
}

impl ToolError {
    pub fn partial(source: &str, cluster: &str, message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
            source: source.to_string(),
            cluster: cluster.to_string(),
            partial_data: true,
        }
    }
}
