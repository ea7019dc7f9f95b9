//! Per-model configuration, passed explicitly into each [`OptimizationModel`](crate::OptimizationModel)
use serde::{Deserialize, Serialize};

use crate::optimize::objective::ObjectiveSense;
use crate::predictive::piecewise::PiecewiseFormulation;

/// Settings that control how a model is lowered and diagnosed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Sense of the objective
    pub sense: ObjectiveSense,
    /// Formulation used for piecewise-linear approximations, unless the predictive model binding
    /// overrides it
    pub formulation: PiecewiseFormulation,
    /// Tolerance under which a pre-activation interval is treated as a single point
    pub tolerance: f64,
    /// Maximum number of solver calls spent on one IIS computation
    pub iis_max_solves: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            sense: ObjectiveSense::Maximize,
            formulation: PiecewiseFormulation::Sos2,
            tolerance: 1e-9,
            iis_max_solves: 10_000,
        }
    }
}

impl ModelConfig {
    /// Parse a configuration from JSON, missing fields take their default value
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = ModelConfig::from_json(r#"{"sense": "minimize", "formulation": "big_m"}"#)
            .unwrap();
        assert_eq!(config.sense, ObjectiveSense::Minimize);
        assert_eq!(config.formulation, PiecewiseFormulation::BigM);
        assert_eq!(config.iis_max_solves, ModelConfig::default().iis_max_solves);
    }
}
