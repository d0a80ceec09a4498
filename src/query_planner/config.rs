//! Planner tuning knobs, loadable from YAML.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read planner configuration: {0}")]
    Read(String),

    #[error("failed to parse planner configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Beam width of the join-order search.
    pub max_states: usize,
    /// Compare candidate extensions against the best complete plan and skip
    /// those whose lower bound already exceeds it. The bound understates
    /// joint-edge savings, so dense graphs may want this off.
    pub lower_bound_pruning: bool,
    /// A DOWNSIZE guard is injected on a join boundary when the statistical
    /// size estimate falls below the host-style estimate by this factor.
    pub downsize_factor: f64,
    /// Primary-key density used when the engine reports none (or reports a
    /// degenerate 1.0).
    pub default_density: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_states: 100,
            lower_bound_pruning: true,
            downsize_factor: 1000.0,
            default_density: 0.005,
        }
    }
}

impl PlannerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_yaml_str(&contents)
    }
}
