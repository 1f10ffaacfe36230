use std::collections::{BTreeMap, HashMap};

use crate::parsing::{parse_cpu_millicores, parse_memory_bytes};
use crate::types::{NodeInfo, PodInfo, PodPhase, PressureLevel, Thresholds};

/// Reported usage for one node, raw quantity strings from the metrics API.
#[derive(Debug, Clone)]
pub struct NodeUsage {
    pub cpu: String,
    pub memory: String,
}

/// Aggregated state of one node pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub allocatable_cpu_millicores: f64,
    pub allocatable_memory_bytes: f64,
    pub used_cpu_millicores: Option<f64>,
    pub used_memory_bytes: Option<f64>,
    pub ready_nodes: usize,
    pub total_nodes: usize,
    pub pending_pods: i64,
}

impl PoolStats {
    pub fn cpu_percent(&self) -> Option<f64> {
        percentage(self.used_cpu_millicores, self.allocatable_cpu_millicores)
    }

    pub fn memory_percent(&self) -> Option<f64> {
        percentage(self.used_memory_bytes, self.allocatable_memory_bytes)
    }
}

fn percentage(used: Option<f64>, allocatable: f64) -> Option<f64> {
    match used {
        Some(u) if allocatable > 0.0 => Some(u / allocatable * 100.0),
        _ => None,
    }
}

/// Combine the three pressure signals into one severity.
///
/// Each signal is evaluated against its own thresholds; missing metrics
/// contribute no candidate; the result is the maximum severity, Ok when
/// nothing fires. Pure and total.
pub fn classify_pressure(
    cpu_pct: Option<f64>,
    mem_pct: Option<f64>,
    pending_pods: i64,
    thresholds: &Thresholds,
) -> PressureLevel {
    let mut level = PressureLevel::Ok;

    if let Some(cpu) = cpu_pct {
        level = level.max(band(cpu, thresholds.cpu_warning, thresholds.cpu_critical));
    }
    if let Some(mem) = mem_pct {
        level = level.max(band(mem, thresholds.memory_warning, thresholds.memory_critical));
    }
    if pending_pods > thresholds.pending_pods_critical {
        level = level.max(PressureLevel::Critical);
    } else if pending_pods >= thresholds.pending_pods_warning {
        level = level.max(PressureLevel::Warning);
    }

    level
}

fn band(value: f64, warning: f64, critical: f64) -> PressureLevel {
    if value >= critical {
        PressureLevel::Critical
    } else if value >= warning {
        PressureLevel::Warning
    } else {
        PressureLevel::Ok
    }
}

pub const UNKNOWN_POOL: &str = "unknown";

/// Group nodes by pool and sum allocatable/used resources and pending pods.
///
/// Pending pods are attributed to the pool of their assigned node; pods with
/// no assigned node, or whose node maps to no known pool, are added to every
/// pool's count — the scheduler has not decided placement yet, so all pools
/// share the risk.
pub fn aggregate_pools(
    nodes: &[NodeInfo],
    metrics: Option<&HashMap<String, NodeUsage>>,
    pods: &[PodInfo],
) -> BTreeMap<String, PoolStats> {
    let mut pools: BTreeMap<String, PoolStats> = BTreeMap::new();
    let mut node_pool: HashMap<&str, String> = HashMap::new();

    for node in nodes {
        let pool_name = node.pool.clone().unwrap_or_else(|| UNKNOWN_POOL.to_string());
        node_pool.insert(node.name.as_str(), pool_name.clone());
        let stats = pools.entry(pool_name).or_default();

        stats.total_nodes += 1;
        if node.ready {
            stats.ready_nodes += 1;
        }
        stats.allocatable_cpu_millicores += parse_cpu_millicores(&node.allocatable_cpu);
        stats.allocatable_memory_bytes += parse_memory_bytes(&node.allocatable_memory);

        if let Some(usage) = metrics.and_then(|m| m.get(&node.name)) {
            *stats.used_cpu_millicores.get_or_insert(0.0) += parse_cpu_millicores(&usage.cpu);
            *stats.used_memory_bytes.get_or_insert(0.0) += parse_memory_bytes(&usage.memory);
        }
    }

    for pod in pods {
        if pod.phase != PodPhase::Pending {
            continue;
        }
        let assigned_pool = pod
            .node_name
            .as_deref()
            .and_then(|n| node_pool.get(n).cloned());
        match assigned_pool {
            Some(pool_name) => {
                if let Some(stats) = pools.get_mut(&pool_name) {
                    stats.pending_pods += 1;
                }
            }
            None => {
                for stats in pools.values_mut() {
                    stats.pending_pods += 1;
                }
            }
        }
    }

    pools
}
