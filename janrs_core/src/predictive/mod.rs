//! Module for embedding pretrained predictive models into optimization problems
//!
//! Training happens elsewhere. A trained model is described to this crate through the
//! [`PredictiveModel`] trait, which exposes its feature schema, a black box `predict`, and (when
//! available) the structure needed to linearize it.

pub mod binding;
pub mod linear;
pub mod lowering;
pub mod mlp;
pub mod piecewise;
pub mod relu;

use std::fmt::{Debug, Display, Formatter};

use thiserror::Error;

pub use binding::{FeatureSource, OptimizationPredictiveModel};
pub use linear::{LinearRegression, LogisticRegression};
pub use lowering::{CustomLinearization, LinearInput, LoweringContext, LoweringError};
pub use mlp::{Activation, DenseLayer, MlpRegressor};
pub use piecewise::PiecewiseFormulation;
pub use relu::ReluNetworkLinearization;

/// A trained predictive model with a scalar output
pub trait PredictiveModel: Debug + Send + Sync {
    /// Ordered names of the features the model expects
    fn feature_names(&self) -> &[String];

    /// Evaluate the model on one feature vector, ordered as [`PredictiveModel::feature_names`]
    fn predict(&self, features: &[f64]) -> Result<f64, PredictiveModelError>;

    /// Structure of the model, used to pick a linearization strategy
    fn structure(&self) -> ModelStructure<'_>;

    /// Check that a feature vector has the expected length
    fn check_dimension(&self, features: &[f64]) -> Result<(), PredictiveModelError> {
        let expected = self.feature_names().len();
        if features.len() != expected {
            return Err(PredictiveModelError::DimensionMismatch {
                expected,
                found: features.len(),
            });
        }
        Ok(())
    }
}

/// How the output of a model depends on its inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelStructure<'a> {
    /// `weights . x + intercept`
    Affine { weights: &'a [f64], intercept: f64 },
    /// `link(weights . x + intercept)` for a scalar nonlinear link
    ScalarLink {
        weights: &'a [f64],
        intercept: f64,
        link: LinkFunction,
    },
    /// No structure is exposed, only `predict`
    Opaque,
}

/// Scalar nonlinear link functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkFunction {
    /// The logistic function `1 / (1 + exp(-z))`
    Sigmoid,
}

impl LinkFunction {
    pub fn apply(&self, z: f64) -> f64 {
        match self {
            LinkFunction::Sigmoid => sigmoid(z),
        }
    }
}

impl Display for LinkFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkFunction::Sigmoid => write!(f, "sigmoid"),
        }
    }
}

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let e = z.exp();
        e / (1. + e)
    }
}

/// Errors associated with predictive models
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictiveModelError {
    /// A feature vector or parameter vector has the wrong length
    #[error("Expected {expected} values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// The model parameters are inconsistent
    #[error("Invalid predictive model: {0}")]
    InvalidModel(String),
    /// A serialized model could not be read
    #[error("Could not read predictive model: {0}")]
    Io(String),
    /// A serialized model could not be parsed
    #[error("Could not parse predictive model: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_symmetric_and_stable() {
        assert!((sigmoid(0.) - 0.5).abs() < 1e-15);
        assert!((sigmoid(2.) + sigmoid(-2.) - 1.).abs() < 1e-15);
        assert!(sigmoid(-800.) >= 0.);
        assert!(sigmoid(800.) <= 1.);
        assert_eq!(LinkFunction::Sigmoid.apply(0.), 0.5);
    }
}
