use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::errors::ToolCallError;
use crate::types::{ClusterTarget, Thresholds};

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Registry of configured cluster targets, keyed by composite id. Built
/// once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    clusters: BTreeMap<String, ClusterTarget>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    clusters: Vec<ClusterTarget>,
}

impl ClusterRegistry {
    pub fn from_targets(targets: Vec<ClusterTarget>) -> Result<Self> {
        if targets.is_empty() {
            return Err(anyhow!("cluster registry is empty"));
        }
        let mut clusters = BTreeMap::new();
        for target in targets {
            validate_target(&target)?;
            if clusters.insert(target.id.clone(), target.clone()).is_some() {
                return Err(anyhow!("duplicate cluster id '{}'", target.id));
            }
        }
        Ok(Self { clusters })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading cluster registry {}", path.display()))?;
        let file: RegistryFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing cluster registry {}", path.display()))?;
        Self::from_targets(file.clusters)
    }

    pub fn ids(&self) -> Vec<String> {
        self.clusters.keys().cloned().collect()
    }

    /// Resolve one cluster id, failing with the full list of valid ids.
    pub fn resolve(&self, id: &str) -> Result<&ClusterTarget, ToolCallError> {
        self.clusters.get(id).ok_or_else(|| ToolCallError::UnknownCluster {
            id: id.to_string(),
            valid: self.ids(),
        })
    }

    /// Resolve a cluster id or the literal "all" into concrete targets.
    pub fn resolve_many(&self, id: &str) -> Result<Vec<ClusterTarget>, ToolCallError> {
        if id == "all" {
            Ok(self.clusters.values().cloned().collect())
        } else {
            self.resolve(id).map(|t| vec![t.clone()])
        }
    }
}

fn validate_target(target: &ClusterTarget) -> Result<()> {
    for (field, value) in [
        ("id", &target.id),
        ("environment", &target.environment),
        ("region", &target.region),
        ("subscription_id", &target.subscription_id),
        ("resource_group", &target.resource_group),
        ("cluster_name", &target.cluster_name),
    ] {
        if value.trim().is_empty() {
            return Err(anyhow!("cluster '{}': missing {}", target.id, field));
        }
        let lowered = value.to_lowercase();
        if lowered.contains("changeme") || lowered.contains("placeholder") || value.contains("<") {
            return Err(anyhow!(
                "cluster '{}': {} looks like a placeholder ('{}')",
                target.id,
                field,
                value
            ));
        }
    }
    Ok(())
}

pub fn load_registry() -> Result<ClusterRegistry> {
    load_registry_with_env(&SystemEnvironment)
}

pub fn load_registry_with_env<E: EnvironmentProvider>(env: &E) -> Result<ClusterRegistry> {
    let path = env
        .get_var("FLEET_CLUSTERS_FILE")
        .ok_or_else(|| anyhow!("FLEET_CLUSTERS_FILE env var must point at the cluster registry"))?;
    ClusterRegistry::load(Path::new(&path))
}

pub fn load_thresholds() -> Result<Thresholds> {
    load_thresholds_with_env(&SystemEnvironment)
}

pub fn load_thresholds_with_env<E: EnvironmentProvider>(env: &E) -> Result<Thresholds> {
    let defaults = Thresholds::default();
    Ok(Thresholds {
        cpu_warning: parse_override(env, "FLEET_CPU_WARNING", defaults.cpu_warning)?,
        cpu_critical: parse_override(env, "FLEET_CPU_CRITICAL", defaults.cpu_critical)?,
        memory_warning: parse_override(env, "FLEET_MEMORY_WARNING", defaults.memory_warning)?,
        memory_critical: parse_override(env, "FLEET_MEMORY_CRITICAL", defaults.memory_critical)?,
        pending_pods_warning: parse_override(
            env,
            "FLEET_PENDING_PODS_WARNING",
            defaults.pending_pods_warning,
        )?,
        pending_pods_critical: parse_override(
            env,
            "FLEET_PENDING_PODS_CRITICAL",
            defaults.pending_pods_critical,
        )?,
        upgrade_anomaly_minutes: parse_override(
            env,
            "FLEET_UPGRADE_ANOMALY_MINUTES",
            defaults.upgrade_anomaly_minutes,
        )?,
    })
}

fn parse_override<E, T>(env: &E, key: &str, default: T) -> Result<T>
where
    E: EnvironmentProvider,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env.get_var(key) {
        Some(raw) => raw.parse::<T>().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
