//! Repair configuration.
//!
//! Both resolvers ship alternate algorithms side by side. They all converge,
//! so a deployment picks one uniformly for every replica; mixing strategies
//! across replicas breaks convergence.
//!
//! Environment variables read by [`RepairConfig::from_env`]:
//! - `COGRAPH_CYCLE_STRATEGY`: `optimized` (default) or `not-optimized`
//! - `COGRAPH_PATH_POLICY`: `virtual-graph` (default), `cheapest-path` or `causal-path`
//! - `COGRAPH_MAX_ENUMERATED_TOMBSTONES`: gate for exhaustive path search (default 12)

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// How the cycle resolver chooses which edge to drop next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStrategy {
    /// Causally latest edge, then the one in most unresolved cycles, then
    /// the latest edge-log position.
    #[default]
    Optimized,
    /// Latest edge-log position only.
    NotOptimized,
}

/// How the connectivity resolver picks a multi-hop tombstone path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathPolicy {
    /// Breadth-first search over the tombstone graph from the root's
    /// component. Polynomial; not necessarily the causally preferred path.
    #[default]
    VirtualGraph,
    /// Exhaustive enumeration; lowest bit-cost path between two components.
    CheapestPath,
    /// Exhaustive enumeration; paths merging the most components, then
    /// causal dominance, then bit-cost.
    CausalPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub cycle_strategy: CycleStrategy,
    pub path_policy: PathPolicy,
    /// Exhaustive path enumeration is factorial in the number of tombstones.
    /// Above this many live tombstones the virtual-graph search is used
    /// regardless of `path_policy`.
    pub max_enumerated_tombstones: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            cycle_strategy: CycleStrategy::Optimized,
            path_policy: PathPolicy::VirtualGraph,
            max_enumerated_tombstones: 12,
        }
    }
}

impl RepairConfig {
    /// Builds a configuration from `COGRAPH_*` environment variables,
    /// falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, GraphError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GraphError> {
        let mut config = RepairConfig::default();
        if let Some(value) = lookup("COGRAPH_CYCLE_STRATEGY") {
            config.cycle_strategy = value.parse()?;
        }
        if let Some(value) = lookup("COGRAPH_PATH_POLICY") {
            config.path_policy = value.parse()?;
        }
        if let Some(value) = lookup("COGRAPH_MAX_ENUMERATED_TOMBSTONES") {
            config.max_enumerated_tombstones =
                value.trim().parse().map_err(|_| GraphError::InvalidConfig {
                    reason: format!(
                        "COGRAPH_MAX_ENUMERATED_TOMBSTONES must be an integer >= 0, got '{}'",
                        value
                    ),
                })?;
        }
        Ok(config)
    }
}

impl FromStr for CycleStrategy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimized" => Ok(CycleStrategy::Optimized),
            "not-optimized" | "not_optimized" => Ok(CycleStrategy::NotOptimized),
            other => Err(GraphError::InvalidConfig {
                reason: format!(
                    "unknown cycle strategy '{}', expected optimized/not-optimized",
                    other
                ),
            }),
        }
    }
}

impl FromStr for PathPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtual-graph" | "virtual_graph" => Ok(PathPolicy::VirtualGraph),
            "cheapest-path" | "cheapest_path" => Ok(PathPolicy::CheapestPath),
            "causal-path" | "causal_path" => Ok(PathPolicy::CausalPath),
            other => Err(GraphError::InvalidConfig {
                reason: format!(
                    "unknown path policy '{}', expected virtual-graph/cheapest-path/causal-path",
                    other
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = RepairConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RepairConfig::default());
        assert_eq!(config.path_policy, PathPolicy::VirtualGraph);
        assert_eq!(config.cycle_strategy, CycleStrategy::Optimized);
    }

    #[test]
    fn reads_every_variable() {
        let config = RepairConfig::from_lookup(lookup(&[
            ("COGRAPH_CYCLE_STRATEGY", "not-optimized"),
            ("COGRAPH_PATH_POLICY", "Causal-Path"),
            ("COGRAPH_MAX_ENUMERATED_TOMBSTONES", " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.cycle_strategy, CycleStrategy::NotOptimized);
        assert_eq!(config.path_policy, PathPolicy::CausalPath);
        assert_eq!(config.max_enumerated_tombstones, 4);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = RepairConfig::from_lookup(lookup(&[("COGRAPH_PATH_POLICY", "dijkstra")]))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfig { .. }));

        let err = RepairConfig::from_lookup(lookup(&[(
            "COGRAPH_MAX_ENUMERATED_TOMBSTONES",
            "-1",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("integer >= 0"));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: RepairConfig =
            serde_json::from_str(r#"{"path_policy": "cheapest-path"}"#).unwrap();
        assert_eq!(config.path_policy, PathPolicy::CheapestPath);
        assert_eq!(config.max_enumerated_tombstones, 12);
    }
}
