//! Small feed-forward neural network regressors
//!
//! The network does not expose an affine or scalar-link structure, so embedding it requires a
//! custom linearization such as [`ReluNetworkLinearization`](crate::predictive::relu::ReluNetworkLinearization).
use std::fmt::{Display, Formatter};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::predictive::{sigmoid, ModelStructure, PredictiveModel, PredictiveModelError};

/// Activation applied after every hidden layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Relu,
    Logistic,
    Tanh,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.),
            Activation::Logistic => sigmoid(x),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Whether the activation is piecewise linear and can be encoded exactly in a MIP
    pub fn is_piecewise_linear(&self) -> bool {
        matches!(self, Activation::Identity | Activation::Relu)
    }
}

impl Display for Activation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Identity => write!(f, "identity"),
            Activation::Relu => write!(f, "relu"),
            Activation::Logistic => write!(f, "logistic"),
            Activation::Tanh => write!(f, "tanh"),
        }
    }
}

/// A fully connected layer computing `weights * x + bias`
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    /// Matrix of shape (outputs, inputs)
    pub weights: DMatrix<f64>,
    /// Vector of length outputs
    pub bias: DVector<f64>,
}

impl DenseLayer {
    /// Create a layer from row-major weights, one row per output neuron
    pub fn from_rows(rows: &[Vec<f64>], bias: Vec<f64>) -> Result<Self, PredictiveModelError> {
        let outputs = rows.len();
        let inputs = rows.first().map(|r| r.len()).unwrap_or(0);
        if outputs == 0 || inputs == 0 {
            return Err(PredictiveModelError::InvalidModel(
                "layers need at least one input and one output".to_string(),
            ));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != inputs) {
            return Err(PredictiveModelError::DimensionMismatch {
                expected: inputs,
                found: row.len(),
            });
        }
        if bias.len() != outputs {
            return Err(PredictiveModelError::DimensionMismatch {
                expected: outputs,
                found: bias.len(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Ok(DenseLayer {
            weights: DMatrix::from_row_slice(outputs, inputs, &flat),
            bias: DVector::from_vec(bias),
        })
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    fn forward(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.weights * x + &self.bias
    }
}

/// A multi-layer perceptron regressor with a single, identity activated output
#[derive(Debug, Clone, PartialEq)]
pub struct MlpRegressor {
    feature_names: Vec<String>,
    layers: Vec<DenseLayer>,
    activation: Activation,
}

impl MlpRegressor {
    /// Create a network from its layers, the last layer must have a single output
    pub fn new<S: AsRef<str>>(
        feature_names: &[S],
        layers: Vec<DenseLayer>,
        activation: Activation,
    ) -> Result<Self, PredictiveModelError> {
        let first = layers.first().ok_or_else(|| {
            PredictiveModelError::InvalidModel("a network needs at least one layer".to_string())
        })?;
        if first.inputs() != feature_names.len() {
            return Err(PredictiveModelError::DimensionMismatch {
                expected: feature_names.len(),
                found: first.inputs(),
            });
        }
        for pair in layers.windows(2) {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(PredictiveModelError::DimensionMismatch {
                    expected: pair[0].outputs(),
                    found: pair[1].inputs(),
                });
            }
        }
        let last = &layers[layers.len() - 1];
        if last.outputs() != 1 {
            return Err(PredictiveModelError::InvalidModel(format!(
                "the output layer must have one neuron, found {}",
                last.outputs()
            )));
        }
        Ok(MlpRegressor {
            feature_names: feature_names
                .iter()
                .map(|n| n.as_ref().to_string())
                .collect(),
            layers,
            activation,
        })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Activation of the hidden layers
    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl PredictiveModel for MlpRegressor {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> Result<f64, PredictiveModelError> {
        self.check_dimension(features)?;
        let mut x = DVector::from_column_slice(features);
        let hidden = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x);
            if i < hidden {
                x.apply(|v| *v = self.activation.apply(*v));
            }
        }
        Ok(x[0])
    }

    fn structure(&self) -> ModelStructure<'_> {
        ModelStructure::Opaque
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_network() -> MlpRegressor {
        // h1 = relu(x - y), h2 = relu(y - 1), out = 2 h1 + h2 + 0.5
        let hidden = DenseLayer::from_rows(&[vec![1., -1.], vec![0., 1.]], vec![0., -1.]).unwrap();
        let output = DenseLayer::from_rows(&[vec![2., 1.]], vec![0.5]).unwrap();
        MlpRegressor::new(&["x", "y"], vec![hidden, output], Activation::Relu).unwrap()
    }

    #[test]
    fn forward_pass() {
        let network = tiny_network();
        assert!((network.predict(&[3., 1.]).unwrap() - 4.5).abs() < 1e-12);
        assert!((network.predict(&[0., 2.]).unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(network.structure(), ModelStructure::Opaque);
    }

    #[test]
    fn shape_validation() {
        let hidden = DenseLayer::from_rows(&[vec![1., -1.]], vec![0.]).unwrap();
        let wide_output = DenseLayer::from_rows(&[vec![1.], vec![1.]], vec![0., 0.]).unwrap();
        assert!(MlpRegressor::new(&["x", "y"], vec![hidden.clone(), wide_output], Activation::Relu)
            .is_err());
        assert!(MlpRegressor::new(&["x"], vec![hidden], Activation::Relu).is_err());
        assert!(DenseLayer::from_rows(&[vec![1., 2.], vec![1.]], vec![0., 0.]).is_err());
        assert!(DenseLayer::from_rows(&[vec![1.]], vec![0., 0.]).is_err());
    }

    #[test]
    fn activations() {
        assert_eq!(Activation::Relu.apply(-2.), 0.);
        assert!(Activation::Relu.is_piecewise_linear());
        assert!(!Activation::Tanh.is_piecewise_linear());
    }
}
