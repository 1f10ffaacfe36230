use crate::types::{ContainerInfo, FailureCategory, PodInfo, PodPhase};

const SCHEDULING_REASONS: &[&str] = &[
    "Unschedulable",
    "FailedScheduling",
    "InsufficientCPU",
    "InsufficientMemory",
];
const RUNTIME_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "OOMKilled",
    "Error",
    "ContainerStatusUnknown",
];
const REGISTRY_REASONS: &[&str] = &["ImagePullBackOff", "ErrImagePull", "ErrImageNeverPull"];
const CONFIG_REASONS: &[&str] = &[
    "CreateContainerConfigError",
    "InvalidImageName",
    "RunContainerError",
];

const CATEGORY_SETS: &[(FailureCategory, &[&str])] = &[
    (FailureCategory::Scheduling, SCHEDULING_REASONS),
    (FailureCategory::Runtime, RUNTIME_REASONS),
    (FailureCategory::Registry, REGISTRY_REASONS),
    (FailureCategory::Config, CONFIG_REASONS),
];

fn reason_in(set: &[&str], reason: &str) -> bool {
    set.contains(&reason)
}

/// Map pod and container state into the fixed failure taxonomy.
///
/// Resolution order: pod-level scheduling reason first (a pod that never got
/// a container has no container state to inspect), then current container
/// waiting reasons by category priority, then a previous OOMKill, then
/// pod-level runtime/registry/config reasons.
pub fn categorize_failure(
    pod_reason: Option<&str>,
    containers: &[ContainerInfo],
) -> FailureCategory {
    if let Some(reason) = pod_reason {
        if reason_in(SCHEDULING_REASONS, reason) {
            return FailureCategory::Scheduling;
        }
    }

    for (category, set) in CATEGORY_SETS {
        for container in containers {
            if let Some(reason) = container.state.waiting_reason() {
                if reason_in(set, reason) {
                    return *category;
                }
            }
        }
    }

    // A container that recovered after an OOM kill is still reporting a
    // meaningful signal via its last terminated state.
    for container in containers {
        if container.last_terminated_reason.as_deref() == Some("OOMKilled") {
            return FailureCategory::Runtime;
        }
    }

    if let Some(reason) = pod_reason {
        for (category, set) in CATEGORY_SETS {
            if *category != FailureCategory::Scheduling && reason_in(set, reason) {
                return *category;
            }
        }
    }

    FailureCategory::Unknown
}

/// Is this pod in a state an operator should look at?
///
/// Restart churn matters: a Running pod whose previous run was OOM killed
/// is still flagged.
pub fn is_unhealthy(pod: &PodInfo) -> bool {
    if matches!(pod.phase, PodPhase::Pending | PodPhase::Failed | PodPhase::Unknown) {
        return true;
    }

    for container in &pod.containers {
        if let Some(reason) = container.state.waiting_reason() {
            if reason_in(RUNTIME_REASONS, reason)
                || reason_in(REGISTRY_REASONS, reason)
                || reason_in(CONFIG_REASONS, reason)
            {
                return true;
            }
        }
        if container.last_terminated_reason.as_deref() == Some("OOMKilled") {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContainerState;
    use std::collections::BTreeMap;

    fn container(state: ContainerState, last_terminated: Option<&str>) -> ContainerInfo {
        ContainerInfo {
            name: "app".to_string(),
            ready: false,
            restart_count: 0,
            state,
            last_terminated_reason: last_terminated.map(str::to_string),
            last_terminated_exit_code: None,
        }
    }

    fn waiting(reason: &str) -> ContainerInfo {
        container(
            ContainerState::Waiting {
                reason: Some(reason.to_string()),
            },
            None,
        )
    }

    fn pod(phase: PodPhase, containers: Vec<ContainerInfo>) -> PodInfo {
        PodInfo {
            name: "p".to_string(),
            namespace: "default".to_string(),
            phase,
            node_name: Some("node-1".to_string()),
            labels: BTreeMap::new(),
            reason: None,
            message: None,
            containers,
        }
    }

    #[test]
    fn test_pod_level_scheduling_reason_wins() {
        // Even with a runtime-looking container, a scheduling pod reason is
        // checked first.
        let containers = vec![waiting("CrashLoopBackOff")];
        assert_eq!(
            categorize_failure(Some("FailedScheduling"), &containers),
            FailureCategory::Scheduling
        );
        assert_eq!(
            categorize_failure(Some("Unschedulable"), &[]),
            FailureCategory::Scheduling
        );
    }

    #[test]
    fn test_container_waiting_reasons_by_category() {
        assert_eq!(
            categorize_failure(None, &[waiting("CrashLoopBackOff")]),
            FailureCategory::Runtime
        );
        assert_eq!(
            categorize_failure(None, &[waiting("ImagePullBackOff")]),
            FailureCategory::Registry
        );
        assert_eq!(
            categorize_failure(None, &[waiting("CreateContainerConfigError")]),
            FailureCategory::Config
        );
    }

    #[test]
    fn test_category_priority_across_containers() {
        // Runtime outranks config when different containers report both.
        let containers = vec![waiting("CreateContainerConfigError"), waiting("Error")];
        assert_eq!(categorize_failure(None, &containers), FailureCategory::Runtime);
    }

    #[test]
    fn test_last_terminated_oomkill_is_runtime() {
        // Recovered-after-OOM container, currently running.
        let containers = vec![container(ContainerState::Running, Some("OOMKilled"))];
        assert_eq!(categorize_failure(None, &containers), FailureCategory::Runtime);
    }

    #[test]
    fn test_last_terminated_non_oom_does_not_match() {
        let containers = vec![container(ContainerState::Running, Some("Completed"))];
        assert_eq!(categorize_failure(None, &containers), FailureCategory::Unknown);
    }

    #[test]
    fn test_pod_level_fallback_reasons() {
        assert_eq!(
            categorize_failure(Some("OOMKilled"), &[]),
            FailureCategory::Runtime
        );
        assert_eq!(
            categorize_failure(Some("ErrImagePull"), &[]),
            FailureCategory::Registry
        );
        assert_eq!(
            categorize_failure(Some("InvalidImageName"), &[]),
            FailureCategory::Config
        );
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        assert_eq!(categorize_failure(None, &[]), FailureCategory::Unknown);
        assert_eq!(
            categorize_failure(Some("Evicted"), &[waiting("SomethingNew")]),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn test_reason_matching_is_case_sensitive() {
        assert_eq!(
            categorize_failure(None, &[waiting("crashloopbackoff")]),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn test_unhealthy_phases() {
        assert!(is_unhealthy(&pod(PodPhase::Pending, vec![])));
        assert!(is_unhealthy(&pod(PodPhase::Failed, vec![])));
        assert!(is_unhealthy(&pod(PodPhase::Unknown, vec![])));
        assert!(!is_unhealthy(&pod(PodPhase::Running, vec![])));
        assert!(!is_unhealthy(&pod(PodPhase::Succeeded, vec![])));
    }

    #[test]
    fn test_unhealthy_by_container_waiting_reason() {
        assert!(is_unhealthy(&pod(
            PodPhase::Running,
            vec![waiting("ImagePullBackOff")]
        )));
        // Scheduling reasons are pod-level; a waiting container with one is
        // not itself an unhealthy signal.
        assert!(!is_unhealthy(&pod(
            PodPhase::Running,
            vec![waiting("Unschedulable")]
        )));
    }

    #[test]
    fn test_running_pod_with_previous_oomkill_is_unhealthy() {
        let p = pod(
            PodPhase::Running,
            vec![container(ContainerState::Running, Some("OOMKilled"))],
        );
        assert!(is_unhealthy(&p));
        assert_eq!(
            categorize_failure(p.reason.as_deref(), &p.containers),
            FailureCategory::Runtime
        );
    }
}
