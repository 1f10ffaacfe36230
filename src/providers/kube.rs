use k8s_openapi::api::core::v1::{Event, Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::config::KubeConfigOptions;
use kube::{api::ListParams, Api, Client};
use serde::Deserialize;
use std::collections::HashMap;

use crate::analysis::NodeUsage;
use crate::errors::ProviderError;
use crate::types::{
    BudgetValue, ContainerInfo, ContainerState, EventInfo, NodeInfo, PdbInfo, PodInfo, PodPhase,
};

/// Pool labels, primary first. AKS stamps the canonical one; very old node
/// images only carry the legacy form.
const POOL_LABELS: &[&str] = &["kubernetes.azure.com/agentpool", "agentpool"];

/// Read-only access to one cluster's API objects, events, metrics and
/// policies. Everything is converted to typed records at this boundary.
#[derive(Clone)]
pub struct ClusterObjects {
    client: Client,
}

impl ClusterObjects {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for the named kubeconfig context; an empty context
    /// falls back to the ambient default configuration.
    pub async fn connect(kube_context: &str) -> Result<Self, ProviderError> {
        let config = if kube_context.is_empty() {
            kube::Config::infer()
                .await
                .map_err(|e| ProviderError::KubeConfig(e.to_string()))?
        } else {
            let options = KubeConfigOptions {
                context: Some(kube_context.to_string()),
                ..Default::default()
            };
            kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ProviderError::KubeConfig(e.to_string()))?
        };
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ProviderError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&ListParams::default()).await?;
        Ok(nodes.items.iter().filter_map(node_info).collect())
    }

    pub async fn list_pods(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<PodInfo>, ProviderError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = field_selector {
            params = params.fields(selector);
        }
        let pods = api.list(&params).await?;
        Ok(pods.items.iter().filter_map(pod_info).collect())
    }

    /// Node-scoped events, optionally narrowed to a reason set.
    pub async fn list_node_events(
        &self,
        reasons: Option<&[&str]>,
    ) -> Result<Vec<EventInfo>, ProviderError> {
        let api: Api<Event> = Api::all(self.client.clone());
        let params = ListParams::default().fields("involvedObject.kind=Node");
        let events = api.list(&params).await?;
        Ok(events
            .items
            .iter()
            .map(event_info)
            .filter(|e| reasons.map_or(true, |set| set.contains(&e.reason.as_str())))
            .collect())
    }

    pub async fn list_pod_events(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<EventInfo>, ProviderError> {
        let api: Api<Event> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = ListParams::default().fields("involvedObject.kind=Pod");
        let events = api.list(&params).await?;
        Ok(events.items.iter().map(event_info).collect())
    }

    /// Current node usage from the metrics API. Callers must tolerate this
    /// failing: pressure computation degrades to null percentages.
    pub async fn list_node_metrics(&self) -> Result<HashMap<String, NodeUsage>, ProviderError> {
        use http::Request as HttpRequest;
        let req = HttpRequest::builder()
            .method("GET")
            .uri("/apis/metrics.k8s.io/v1beta1/nodes")
            .body(Vec::new())
            .map_err(|e| ProviderError::Decode(format!("build request: {e}")))?;
        let list: NodeMetricsList = self.client.request(req).await?;

        let mut usage = HashMap::new();
        for item in list.items {
            let name = item
                .metadata
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            if name.is_empty() {
                continue;
            }
            usage.insert(
                name,
                NodeUsage {
                    cpu: item.usage.get("cpu").cloned().unwrap_or_default(),
                    memory: item.usage.get("memory").cloned().unwrap_or_default(),
                },
            );
        }
        Ok(usage)
    }

    pub async fn list_pdbs(&self, namespace: Option<&str>) -> Result<Vec<PdbInfo>, ProviderError> {
        let api: Api<PodDisruptionBudget> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let pdbs = api.list(&ListParams::default()).await?;
        Ok(pdbs.items.iter().filter_map(pdb_info).collect())
    }
}

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    metadata: serde_json::Value,
    usage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetricsItem>,
}

fn node_info(node: &Node) -> Option<NodeInfo> {
    let name = node.metadata.name.clone()?;
    let labels = node.metadata.labels.as_ref();
    let pool = labels.and_then(|l| {
        POOL_LABELS
            .iter()
            .find_map(|key| l.get(*key).cloned())
    });

    let status = node.status.as_ref();
    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    let allocatable_cpu = allocatable
        .and_then(|a| a.get("cpu"))
        .map(|q| q.0.clone())
        .unwrap_or_default();
    let allocatable_memory = allocatable
        .and_then(|a| a.get("memory"))
        .map(|q| q.0.clone())
        .unwrap_or_default();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let kubelet_version = status
        .and_then(|s| s.node_info.as_ref())
        .map(|i| i.kubelet_version.clone())
        .unwrap_or_default();

    Some(NodeInfo {
        name,
        pool,
        unschedulable: node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false),
        allocatable_cpu,
        allocatable_memory,
        ready,
        kubelet_version,
    })
}

fn pod_info(pod: &Pod) -> Option<PodInfo> {
    let name = pod.metadata.name.clone()?;
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let status = pod.status.as_ref();

    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(container_info).collect())
        .unwrap_or_default();

    Some(PodInfo {
        name,
        namespace,
        phase: PodPhase::from_str(status.and_then(|s| s.phase.as_deref()).unwrap_or("")),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        reason: status.and_then(|s| s.reason.clone()),
        message: status.and_then(|s| s.message.clone()),
        containers,
    })
}

fn container_info(cs: &k8s_openapi::api::core::v1::ContainerStatus) -> ContainerInfo {
    let state = match cs.state.as_ref() {
        Some(state) => {
            if let Some(waiting) = state.waiting.as_ref() {
                ContainerState::Waiting {
                    reason: waiting.reason.clone(),
                }
            } else if let Some(terminated) = state.terminated.as_ref() {
                ContainerState::Terminated {
                    reason: terminated.reason.clone(),
                    exit_code: terminated.exit_code,
                }
            } else if state.running.is_some() {
                ContainerState::Running
            } else {
                ContainerState::Unknown
            }
        }
        None => ContainerState::Unknown,
    };

    let last_terminated = cs
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref());

    ContainerInfo {
        name: cs.name.clone(),
        ready: cs.ready,
        restart_count: cs.restart_count,
        state,
        last_terminated_reason: last_terminated.and_then(|t| t.reason.clone()),
        last_terminated_exit_code: last_terminated.map(|t| t.exit_code),
    }
}

fn event_info(event: &Event) -> EventInfo {
    // Recurrence-aware timestamp wins because it reflects the freshest
    // state; series time next, first observation last.
    let timestamp = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0));

    EventInfo {
        reason: event.reason.clone().unwrap_or_default(),
        kind: event.involved_object.kind.clone().unwrap_or_default(),
        name: event.involved_object.name.clone().unwrap_or_default(),
        namespace: event.involved_object.namespace.clone(),
        message: event.message.clone().unwrap_or_default(),
        count: event.count.unwrap_or(1),
        timestamp,
    }
}

fn budget_value(value: &IntOrString) -> BudgetValue {
    match value {
        IntOrString::Int(n) => BudgetValue::Count(*n as i64),
        IntOrString::String(s) => BudgetValue::parse(s),
    }
}

fn pdb_info(pdb: &PodDisruptionBudget) -> Option<PdbInfo> {
    let name = pdb.metadata.name.clone()?;
    let namespace = pdb.metadata.namespace.clone().unwrap_or_default();
    let spec = pdb.spec.as_ref();
    let status = pdb.status.as_ref();

    Some(PdbInfo {
        name,
        namespace,
        selector: spec
            .and_then(|s| s.selector.as_ref())
            .and_then(|s| s.match_labels.clone())
            .unwrap_or_default(),
        min_available: spec.and_then(|s| s.min_available.as_ref()).map(budget_value),
        max_unavailable: spec
            .and_then(|s| s.max_unavailable.as_ref())
            .map(budget_value),
        current_healthy: status.map(|s| s.current_healthy).unwrap_or(0),
        desired_healthy: status.map(|s| s.desired_healthy).unwrap_or(0),
        disruptions_allowed: status.map(|s| s.disruptions_allowed).unwrap_or(0),
        expected_pods: status.map(|s| s.expected_pods).unwrap_or(0),
    })
}
