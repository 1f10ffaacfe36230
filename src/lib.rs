// Public modules
pub mod analysis;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod parsing;
pub mod providers;
pub mod scrub;
pub mod tools;
pub mod types;

// Re-export commonly used items
pub use analysis::{
    aggregate_pools, categorize_failure, classify_node, classify_pressure, estimate_duration,
    evaluate_blockers, is_unhealthy, pool_upgrade_active, summarize_pod_transitions, NodeUsage,
    PdbBlocker,
};
pub use config::{
    load_registry, load_registry_with_env, load_thresholds, load_thresholds_with_env,
    ClusterRegistry, EnvironmentProvider, MockEnvironment, SystemEnvironment,
};
pub use errors::{ProviderError, ToolCallError};
pub use fanout::fan_out;
pub use parsing::{parse_cpu_millicores, parse_memory_bytes};
pub use scrub::scrub_text;
pub use tools::{dispatch, serve_stdio, ToolContext};
pub use types::*;
