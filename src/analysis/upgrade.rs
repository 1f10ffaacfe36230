use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::analysis::failures::{categorize_failure, is_unhealthy};
use crate::types::{EventInfo, FailureCategory, NodeInfo, PodInfo, PodPhase, UpgradeState};

/// Event reasons that carry upgrade lifecycle signal for a node.
pub const UPGRADE_EVENT_REASONS: &[&str] = &["NodeUpgrade", "NodeReady", "NodeNotReady"];

/// Detail list cap for the pod-transition summary; the true total is kept
/// alongside.
pub const POD_TRANSITION_DETAIL_CAP: usize = 20;

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Select the upgrade-relevant events attributed to one node.
pub fn upgrade_events_for_node<'a>(events: &'a [EventInfo], node_name: &str) -> Vec<&'a EventInfo> {
    events
        .iter()
        .filter(|e| {
            e.kind == "Node"
                && e.name == node_name
                && UPGRADE_EVENT_REASONS.contains(&e.reason.as_str())
        })
        .collect()
}

/// Earliest NodeUpgrade timestamp across the pool: the upgrade-wave start.
pub fn upgrade_wave_start(events: &[EventInfo]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.reason == "NodeUpgrade")
        .filter_map(|e| e.timestamp)
        .min()
}

/// Classify one node's position in an in-flight upgrade.
///
/// Evaluated in fixed priority order; PDB-blocked is checked before a flat
/// stall/upgrading verdict so a policy-driven delay is distinguishable from
/// a genuinely stuck upgrade. When the target version is unknown (cloud
/// metadata unavailable), the terminal check degrades to event evidence
/// alone; callers record that as partial data.
pub fn classify_node(
    node: &NodeInfo,
    target_version: Option<&str>,
    node_events: &[&EventInfo],
    has_pdb_blocker: bool,
    wave_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    anomaly_minutes: i64,
) -> UpgradeState {
    let has_upgrade = node_events.iter().any(|e| e.reason == "NodeUpgrade");
    let has_ready = node_events.iter().any(|e| e.reason == "NodeReady");
    let version_matches = match target_version {
        Some(target) => strip_v(&node.kubelet_version) == strip_v(target),
        None => true,
    };

    if has_upgrade && has_ready && version_matches {
        return UpgradeState::Upgraded;
    }

    if has_upgrade && !has_ready {
        let blocked = node.unschedulable && has_pdb_blocker;
        let over_budget = wave_start
            .map(|start| now - start > Duration::minutes(anomaly_minutes))
            .unwrap_or(false);
        return match (over_budget, blocked) {
            (_, true) => UpgradeState::PdbBlocked,
            (true, false) => UpgradeState::Stalled,
            (false, false) => UpgradeState::Upgrading,
        };
    }

    if node.unschedulable {
        return UpgradeState::Cordoned;
    }

    UpgradeState::Pending
}

/// Pool-wide duration estimate via linear extrapolation, assuming uniform
/// per-node duration. An approximation, not a guarantee.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DurationEstimate {
    pub elapsed_seconds: Option<i64>,
    pub mean_seconds_per_node: Option<f64>,
    pub estimated_remaining_seconds: Option<f64>,
    pub anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_message: Option<String>,
}

pub fn estimate_duration(
    states: &[UpgradeState],
    wave_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    anomaly_minutes: i64,
) -> DurationEstimate {
    let Some(start) = wave_start else {
        return DurationEstimate::default();
    };

    let elapsed = (now - start).num_seconds();
    let completed = states.iter().filter(|s| **s == UpgradeState::Upgraded).count();
    let remaining = states.len() - completed;

    let (mean, estimated_remaining) = if completed > 0 && remaining > 0 {
        let mean = elapsed as f64 / completed as f64;
        (Some(mean), Some(mean * remaining as f64))
    } else {
        (None, None)
    };

    let anomaly = elapsed > anomaly_minutes * 60;
    let anomaly_message = if anomaly {
        let text = if states.iter().any(|s| *s == UpgradeState::PdbBlocked) {
            format!(
                "upgrade running {}m exceeds the {}m baseline, but a PDB block was detected",
                elapsed / 60,
                anomaly_minutes
            )
        } else {
            format!(
                "upgrade running {}m exceeds the {}m baseline",
                elapsed / 60,
                anomaly_minutes
            )
        };
        Some(text)
    } else {
        None
    };

    DurationEstimate {
        elapsed_seconds: Some(elapsed),
        mean_seconds_per_node: mean,
        estimated_remaining_seconds: estimated_remaining,
        anomaly,
        anomaly_message,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PodTransition {
    pub name: String,
    pub namespace: String,
    pub node: String,
    pub phase: PodPhase,
    pub category: FailureCategory,
}

/// Unhealthy pods on nodes currently being worked on by the upgrade.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PodTransitionSummary {
    pub pending: usize,
    pub failed: usize,
    pub by_category: BTreeMap<String, usize>,
    pub pods: Vec<PodTransition>,
    pub total: usize,
}

/// Summarize pod churn during an upgrade.
///
/// Only pods on nodes in an active state are considered; callers skip the
/// pod fetch entirely when no node is active. Failed/Unknown pods sort
/// ahead of Pending ones (stable within each group) and the emitted detail
/// list is capped while the true total is retained.
pub fn summarize_pod_transitions(
    pods: &[PodInfo],
    active_nodes: &HashSet<String>,
) -> PodTransitionSummary {
    let mut affected: Vec<(usize, &PodInfo, FailureCategory)> = Vec::new();

    for (index, pod) in pods.iter().enumerate() {
        let Some(node) = pod.node_name.as_deref() else {
            continue;
        };
        if !active_nodes.contains(node) || !is_unhealthy(pod) {
            continue;
        }
        let category = categorize_failure(pod.reason.as_deref(), &pod.containers);
        affected.push((index, pod, category));
    }

    affected.sort_by_key(|(index, pod, _)| (pod.phase == PodPhase::Pending, *index));

    let mut summary = PodTransitionSummary {
        total: affected.len(),
        ..Default::default()
    };
    for (_, pod, category) in &affected {
        if pod.phase == PodPhase::Pending {
            summary.pending += 1;
        } else {
            summary.failed += 1;
        }
        *summary.by_category.entry(category.as_str().to_string()).or_insert(0) += 1;
    }
    summary.pods = affected
        .iter()
        .take(POD_TRANSITION_DETAIL_CAP)
        .map(|(_, pod, category)| PodTransition {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            node: pod.node_name.clone().unwrap_or_default(),
            phase: pod.phase,
            category: *category,
        })
        .collect();

    summary
}

/// Is this pool in an upgrade, as seen from the management plane?
///
/// Provisioning state lags target-version propagation in some windows and
/// vice versa in others, so either signal alone can miss a detection.
pub fn pool_upgrade_active(
    provisioning_state: &str,
    current_version: Option<&str>,
    target_version: Option<&str>,
) -> bool {
    if provisioning_state == "Upgrading" {
        return true;
    }
    match (current_version, target_version) {
        (Some(current), Some(target)) => strip_v(current) != strip_v(target),
        _ => false,
    }
}
