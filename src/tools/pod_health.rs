use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::analysis::{categorize_failure, is_unhealthy};
use crate::errors::ToolCallError;
use crate::providers::ClusterObjects;
use crate::tools::{parse_args, run_for_clusters, validate_namespace, ToolContext};
use crate::types::{
    ClusterTarget, EventInfo, FailureCategory, PodInfo, PodPhase, ToolError,
};

/// Detail list cap; grouped counts and the total always cover everything.
pub const POD_DETAIL_CAP: usize = 50;

const DEFAULT_LOOKBACK_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Pending,
    Failed,
    All,
}

#[derive(Debug, Deserialize)]
struct PodHealthRequest {
    cluster_id: String,
    namespace: Option<String>,
    status_filter: Option<StatusFilter>,
    lookback_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PodDetail {
    pub name: String,
    pub namespace: String,
    pub node: Option<String>,
    pub phase: PodPhase,
    pub category: FailureCategory,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PodHealthResponse {
    pub cluster: String,
    pub pods: Vec<PodDetail>,
    pub counts_by_category: BTreeMap<String, usize>,
    pub pending_count: usize,
    pub failed_count: usize,
    pub total_matching: usize,
    pub truncated: bool,
    pub errors: Vec<ToolError>,
}

pub async fn run(ctx: &ToolContext, args: Value) -> Result<Value, ToolCallError> {
    let request: PodHealthRequest = parse_args(args)?;
    if let Some(namespace) = request.namespace.as_deref() {
        validate_namespace(namespace)?;
    }
    let lookback = request.lookback_minutes.unwrap_or(DEFAULT_LOOKBACK_MINUTES);
    if !(1..=1440).contains(&lookback) {
        return Err(ToolCallError::invalid(
            "lookback_minutes",
            format!("{lookback} is outside 1..=1440"),
        ));
    }
    let filter = request.status_filter.unwrap_or(StatusFilter::All);
    let namespace = request.namespace.clone();

    run_for_clusters(ctx, &request.cluster_id, "get_pod_health", |target| {
        let namespace = namespace.clone();
        async move { Ok(check_cluster(target, namespace.as_deref(), filter, lookback).await) }
    })
    .await
}

async fn check_cluster(
    target: ClusterTarget,
    namespace: Option<&str>,
    filter: StatusFilter,
    lookback_minutes: i64,
) -> PodHealthResponse {
    let cluster = target.id.clone();
    let mut errors = Vec::new();

    let objects = match ClusterObjects::connect(&target.kube_context).await {
        Ok(objects) => objects,
        Err(e) => {
            errors.push(ToolError::partial("kubernetes", &cluster, &e));
            return pod_health_from_parts(cluster, &[], &[], filter, lookback_minutes, Utc::now(), errors);
        }
    };

    // The pod list is foundational; events only enrich the detail rows.
    let pods = match objects.list_pods(namespace, None).await {
        Ok(pods) => pods,
        Err(e) => {
            errors.push(ToolError::partial("pods", &cluster, &e));
            return pod_health_from_parts(cluster, &[], &[], filter, lookback_minutes, Utc::now(), errors);
        }
    };

    let events = match objects.list_pod_events(namespace).await {
        Ok(events) => events,
        Err(e) => {
            errors.push(ToolError::partial("events", &cluster, &e));
            Vec::new()
        }
    };

    pod_health_from_parts(cluster, &pods, &events, filter, lookback_minutes, Utc::now(), errors)
}

fn matches_filter(pod: &PodInfo, filter: StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Pending => pod.phase == PodPhase::Pending,
        StatusFilter::Failed => pod.phase != PodPhase::Pending,
    }
}

fn latest_event_message(
    pod: &PodInfo,
    events: &[EventInfo],
    cutoff: DateTime<Utc>,
) -> Option<String> {
    events
        .iter()
        .filter(|e| {
            e.kind == "Pod"
                && e.name == pod.name
                && e.namespace.as_deref() == Some(pod.namespace.as_str())
                && e.timestamp.map(|t| t >= cutoff).unwrap_or(false)
        })
        .max_by_key(|e| e.timestamp)
        .map(|e| format!("{}: {}", e.reason, e.message))
}

/// Pure assembly over already-fetched data.
pub fn pod_health_from_parts(
    cluster: String,
    pods: &[PodInfo],
    events: &[EventInfo],
    filter: StatusFilter,
    lookback_minutes: i64,
    now: DateTime<Utc>,
    errors: Vec<ToolError>,
) -> PodHealthResponse {
    let cutoff = now - Duration::minutes(lookback_minutes);

    let mut matching: Vec<(usize, &PodInfo, FailureCategory)> = pods
        .iter()
        .enumerate()
        .filter(|(_, pod)| is_unhealthy(pod) && matches_filter(pod, filter))
        .map(|(index, pod)| {
            (index, pod, categorize_failure(pod.reason.as_deref(), &pod.containers))
        })
        .collect();

    // Failed/Unknown rows first, Pending after, stable within each group.
    matching.sort_by_key(|(index, pod, _)| (pod.phase == PodPhase::Pending, *index));

    let total_matching = matching.len();
    let mut counts_by_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut pending_count = 0;
    let mut failed_count = 0;
    for (_, pod, category) in &matching {
        *counts_by_category.entry(category.as_str().to_string()).or_insert(0) += 1;
        if pod.phase == PodPhase::Pending {
            pending_count += 1;
        } else {
            failed_count += 1;
        }
    }

    let details: Vec<PodDetail> = matching
        .iter()
        .take(POD_DETAIL_CAP)
        .map(|(_, pod, category)| PodDetail {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            node: pod.node_name.clone(),
            phase: pod.phase,
            category: *category,
            reason: pod.reason.clone(),
            last_event: latest_event_message(pod, events, cutoff),
        })
        .collect();

    PodHealthResponse {
        cluster,
        truncated: total_matching > POD_DETAIL_CAP,
        pods: details,
        counts_by_category,
        pending_count,
        failed_count,
        total_matching,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContainerInfo, ContainerState};

    fn pod(name: &str, phase: PodPhase, waiting_reason: Option<&str>) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: "default".to_string(),
            phase,
            node_name: Some("node-1".to_string()),
            labels: BTreeMap::new(),
            reason: None,
            message: None,
            containers: waiting_reason
                .map(|r| {
                    vec![ContainerInfo {
                        name: "app".to_string(),
                        ready: false,
                        restart_count: 1,
                        state: ContainerState::Waiting { reason: Some(r.to_string()) },
                        last_terminated_reason: None,
                        last_terminated_exit_code: None,
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn build(
        pods: &[PodInfo],
        events: &[EventInfo],
        filter: StatusFilter,
    ) -> PodHealthResponse {
        pod_health_from_parts(
            "prod-weu".to_string(),
            pods,
            events,
            filter,
            60,
            Utc::now(),
            Vec::new(),
        )
    }

    #[test]
    fn test_healthy_pods_excluded() {
        let pods = vec![
            pod("healthy", PodPhase::Running, None),
            pod("crashing", PodPhase::Running, Some("CrashLoopBackOff")),
        ];
        let response = build(&pods, &[], StatusFilter::All);
        assert_eq!(response.total_matching, 1);
        assert_eq!(response.pods[0].name, "crashing");
        assert_eq!(response.pods[0].category, FailureCategory::Runtime);
    }

    #[test]
    fn test_status_filter_pending_vs_failed() {
        let pods = vec![
            pod("waiting", PodPhase::Pending, None),
            pod("broken", PodPhase::Failed, None),
            pod("crashing", PodPhase::Running, Some("CrashLoopBackOff")),
        ];

        let pending = build(&pods, &[], StatusFilter::Pending);
        assert_eq!(pending.total_matching, 1);
        assert_eq!(pending.pods[0].name, "waiting");

        let failed = build(&pods, &[], StatusFilter::Failed);
        assert_eq!(failed.total_matching, 2);
        let names: Vec<_> = failed.pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["broken", "crashing"]);

        let all = build(&pods, &[], StatusFilter::All);
        assert_eq!(all.total_matching, 3);
        assert_eq!(all.pending_count, 1);
        assert_eq!(all.failed_count, 2);
    }

    #[test]
    fn test_detail_list_caps_at_fifty() {
        let pods: Vec<PodInfo> = (0..60)
            .map(|i| pod(&format!("pod-{i}"), PodPhase::Failed, None))
            .collect();
        let response = build(&pods, &[], StatusFilter::All);
        assert_eq!(response.pods.len(), POD_DETAIL_CAP);
        assert_eq!(response.total_matching, 60);
        assert!(response.truncated);
        assert_eq!(response.counts_by_category.get("unknown"), Some(&60));
    }

    #[test]
    fn test_recent_event_attached_within_lookback() {
        let now = Utc::now();
        let pods = vec![pod("waiting", PodPhase::Pending, None)];
        let events = vec![
            EventInfo {
                reason: "FailedScheduling".to_string(),
                kind: "Pod".to_string(),
                name: "waiting".to_string(),
                namespace: Some("default".to_string()),
                message: "0/5 nodes available".to_string(),
                count: 3,
                timestamp: Some(now - Duration::minutes(5)),
            },
            EventInfo {
                reason: "Stale".to_string(),
                kind: "Pod".to_string(),
                name: "waiting".to_string(),
                namespace: Some("default".to_string()),
                message: "too old".to_string(),
                count: 1,
                timestamp: Some(now - Duration::minutes(600)),
            },
        ];
        let response = pod_health_from_parts(
            "prod-weu".to_string(),
            &pods,
            &events,
            StatusFilter::All,
            60,
            now,
            Vec::new(),
        );
        assert_eq!(
            response.pods[0].last_event.as_deref(),
            Some("FailedScheduling: 0/5 nodes available")
        );
    }

    #[test]
    fn test_failed_sorts_before_pending() {
        let pods = vec![
            pod("pending-1", PodPhase::Pending, None),
            pod("failed-1", PodPhase::Failed, None),
        ];
        let response = build(&pods, &[], StatusFilter::All);
        let names: Vec<_> = response.pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["failed-1", "pending-1"]);
    }
}
