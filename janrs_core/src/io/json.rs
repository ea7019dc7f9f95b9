//! Module providing JSON IO for trained predictive models
//!
//! Training happens in another tool, which exports the learned parameters as a tagged JSON
//! document, for example
//! ```json
//! {"kind": "linear_regression", "feature_names": ["SAT", "GPA"], "coefficients": [0.1, 0.2], "intercept": 0.0}
//! ```
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::optimize::model::ModelError;
use crate::predictive::binding::OptimizationPredictiveModel;
use crate::predictive::mlp::{Activation, DenseLayer, MlpRegressor};
use crate::predictive::relu::ReluNetworkLinearization;
use crate::predictive::{LinearRegression, LogisticRegression, PredictiveModel, PredictiveModelError};

// region JSON Model
/// A serialized trained model, discriminated by its `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    LinearRegression {
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        #[serde(default)]
        intercept: f64,
    },
    LogisticRegression {
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        #[serde(default)]
        intercept: f64,
    },
    MlpRegressor {
        feature_names: Vec<String>,
        activation: Activation,
        layers: Vec<JsonLayer>,
    },
}

/// A dense layer, with one row of weights per output neuron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}
// endregion JSON Model

// region Conversions
impl TrainedModel {
    pub fn feature_names(&self) -> &[String] {
        match self {
            TrainedModel::LinearRegression { feature_names, .. }
            | TrainedModel::LogisticRegression { feature_names, .. }
            | TrainedModel::MlpRegressor { feature_names, .. } => feature_names,
        }
    }

    /// Build the predictive model described by the document
    pub fn into_model(self) -> Result<Arc<dyn PredictiveModel>, PredictiveModelError> {
        let model: Arc<dyn PredictiveModel> = match self {
            TrainedModel::LinearRegression {
                feature_names,
                coefficients,
                intercept,
            } => Arc::new(LinearRegression::new(&feature_names, coefficients, intercept)?),
            TrainedModel::LogisticRegression {
                feature_names,
                coefficients,
                intercept,
            } => Arc::new(LogisticRegression::new(&feature_names, coefficients, intercept)?),
            TrainedModel::MlpRegressor { .. } => Arc::new(self.into_network()?),
        };
        Ok(model)
    }

    /// Build a binding ready for [`OptimizationModel::set_predictive_model`](crate::OptimizationModel::set_predictive_model)
    ///
    /// Networks get a [`ReluNetworkLinearization`] attached, so their hidden activation must be
    /// ReLU or identity by the time the model is lowered.
    pub fn into_binding(self) -> Result<OptimizationPredictiveModel, ModelError> {
        let feature_names = self.feature_names().to_vec();
        match self {
            TrainedModel::MlpRegressor { .. } => {
                let network = Arc::new(self.into_network()?);
                let model: Arc<dyn PredictiveModel> = network.clone();
                Ok(OptimizationPredictiveModel::new(model, &feature_names)?
                    .with_linearization(Arc::new(ReluNetworkLinearization::new(network))))
            }
            _ => OptimizationPredictiveModel::new(self.into_model()?, &feature_names),
        }
    }

    fn into_network(self) -> Result<MlpRegressor, PredictiveModelError> {
        match self {
            TrainedModel::MlpRegressor {
                feature_names,
                activation,
                layers,
            } => {
                let layers = layers
                    .into_iter()
                    .map(|l| DenseLayer::from_rows(&l.weights, l.bias))
                    .collect::<Result<Vec<_>, _>>()?;
                MlpRegressor::new(&feature_names, layers, activation)
            }
            _ => Err(PredictiveModelError::InvalidModel(
                "the document does not describe a network".to_string(),
            )),
        }
    }

    /// Serialize the document as JSON
    pub fn to_json(&self) -> Result<String, PredictiveModelError> {
        serde_json::to_string_pretty(self).map_err(|e| PredictiveModelError::Parse(e.to_string()))
    }
}
// endregion Conversions

/// Parse a trained model document
pub fn parse_trained_model(json: &str) -> Result<TrainedModel, PredictiveModelError> {
    serde_json::from_str(json).map_err(|e| PredictiveModelError::Parse(e.to_string()))
}

/// Read a trained model document from a file
pub fn load_trained_model<P: AsRef<Path>>(path: P) -> Result<TrainedModel, PredictiveModelError> {
    let data = match fs::read_to_string(path.as_ref()) {
        Ok(data) => data,
        Err(err) => {
            return Err(PredictiveModelError::Io(format!(
                "{}: {}",
                path.as_ref().display(),
                err
            )))
        }
    };
    parse_trained_model(&data)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::predictive::ModelStructure;

    fn data_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("trained_models")
            .join(name)
    }

    #[test]
    fn linear_document() {
        let document = parse_trained_model(
            r#"{"kind": "linear_regression", "feature_names": ["SAT", "GPA"], "coefficients": [0.1, 0.2]}"#,
        )
        .unwrap();
        assert_eq!(document.feature_names(), &["SAT".to_string(), "GPA".to_string()]);
        let model = document.into_model().unwrap();
        assert!((model.predict(&[10., 3.]).unwrap() - 1.6).abs() < 1e-12);
        assert!(matches!(model.structure(), ModelStructure::Affine { intercept, .. } if intercept == 0.));
    }

    #[test]
    fn read_logistic_file() {
        let document = load_trained_model(data_path("enrollment_logistic.json")).unwrap();
        let model = document.into_model().unwrap();
        assert_eq!(model.feature_names().len(), 3);
        // decision value 0.8 + 1.1 + 0.6 - 1.5 = 1
        let probability = model.predict(&[1., 1., 1.]).unwrap();
        assert!((probability - crate::predictive::sigmoid(1.)).abs() < 1e-12);
    }

    #[test]
    fn read_network_file() {
        let document = load_trained_model(data_path("applicant_network.json")).unwrap();
        let model = document.clone().into_model().unwrap();
        assert!((model.predict(&[3., 1.]).unwrap() - 4.5).abs() < 1e-12);
        let binding = document.into_binding().unwrap();
        assert!(binding.has_custom_linearization());
        assert!(binding.check_strategy().is_ok());
    }

    #[test]
    fn invalid_documents() {
        assert!(matches!(
            parse_trained_model(r#"{"kind": "random_forest", "feature_names": []}"#),
            Err(PredictiveModelError::Parse(_))
        ));
        let mismatched = parse_trained_model(
            r#"{"kind": "logistic_regression", "feature_names": ["a", "b"], "coefficients": [1.0]}"#,
        )
        .unwrap();
        assert!(matches!(
            mismatched.into_model(),
            Err(PredictiveModelError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            load_trained_model(data_path("missing.json")),
            Err(PredictiveModelError::Io(_))
        ));
    }

    #[test]
    fn documents_survive_serialization() {
        let document = load_trained_model(data_path("applicant_network.json")).unwrap();
        let text = document.to_json().unwrap();
        assert!(text.contains("\"kind\": \"mlp_regressor\""));
        assert_eq!(parse_trained_model(&text).unwrap(), document);
    }
}
