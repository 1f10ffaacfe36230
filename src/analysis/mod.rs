// Pure classifiers and evaluators; no I/O happens in this tree.
pub mod failures;
pub mod pdb;
pub mod pressure;
pub mod upgrade;

pub use failures::{categorize_failure, is_unhealthy};
pub use pdb::{evaluate_blockers, PdbBlocker};
pub use pressure::{aggregate_pools, classify_pressure, NodeUsage, PoolStats};
pub use upgrade::{
    classify_node, estimate_duration, pool_upgrade_active, summarize_pod_transitions,
    upgrade_events_for_node, upgrade_wave_start, DurationEstimate, PodTransitionSummary,
};
