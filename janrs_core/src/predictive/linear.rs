//! Linear and logistic regression models
use nalgebra::DVector;

use crate::predictive::{
    LinkFunction, ModelStructure, PredictiveModel, PredictiveModelError,
};

/// An ordinary linear regression `coefficients . x + intercept`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    feature_names: Vec<String>,
    coefficients: DVector<f64>,
    intercept: f64,
}

impl LinearRegression {
    /// Create a linear regression from its learned parameters
    ///
    /// # Examples
    /// ```rust
    /// use janrs_core::predictive::{LinearRegression, PredictiveModel};
    /// let model = LinearRegression::new(&["SAT", "GPA", "merit"], vec![0.1, 0.2, 0.3], 0.).unwrap();
    /// let prediction = model.predict(&[1., 2., 3.]).unwrap();
    /// assert!((prediction - 1.4).abs() < 1e-12);
    /// ```
    pub fn new<S: AsRef<str>>(
        feature_names: &[S],
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, PredictiveModelError> {
        let (feature_names, coefficients) = checked_parameters(feature_names, coefficients)?;
        Ok(LinearRegression {
            feature_names,
            coefficients,
            intercept,
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        self.coefficients.as_slice()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl PredictiveModel for LinearRegression {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> Result<f64, PredictiveModelError> {
        self.check_dimension(features)?;
        Ok(self.coefficients.dot(&DVector::from_column_slice(features)) + self.intercept)
    }

    fn structure(&self) -> ModelStructure<'_> {
        ModelStructure::Affine {
            weights: self.coefficients.as_slice(),
            intercept: self.intercept,
        }
    }
}

/// A binary logistic regression, predicting the probability of the positive class
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    feature_names: Vec<String>,
    coefficients: DVector<f64>,
    intercept: f64,
}

impl LogisticRegression {
    /// Create a logistic regression from its learned parameters
    pub fn new<S: AsRef<str>>(
        feature_names: &[S],
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, PredictiveModelError> {
        let (feature_names, coefficients) = checked_parameters(feature_names, coefficients)?;
        Ok(LogisticRegression {
            feature_names,
            coefficients,
            intercept,
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        self.coefficients.as_slice()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// The log-odds `coefficients . x + intercept`
    pub fn decision_function(&self, features: &[f64]) -> Result<f64, PredictiveModelError> {
        self.check_dimension(features)?;
        Ok(self.coefficients.dot(&DVector::from_column_slice(features)) + self.intercept)
    }
}

impl PredictiveModel for LogisticRegression {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> Result<f64, PredictiveModelError> {
        Ok(LinkFunction::Sigmoid.apply(self.decision_function(features)?))
    }

    fn structure(&self) -> ModelStructure<'_> {
        ModelStructure::ScalarLink {
            weights: self.coefficients.as_slice(),
            intercept: self.intercept,
            link: LinkFunction::Sigmoid,
        }
    }
}

fn checked_parameters<S: AsRef<str>>(
    feature_names: &[S],
    coefficients: Vec<f64>,
) -> Result<(Vec<String>, DVector<f64>), PredictiveModelError> {
    if feature_names.len() != coefficients.len() {
        return Err(PredictiveModelError::DimensionMismatch {
            expected: feature_names.len(),
            found: coefficients.len(),
        });
    }
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(PredictiveModelError::InvalidModel(
            "coefficients must be finite".to_string(),
        ));
    }
    let names = feature_names
        .iter()
        .map(|n| n.as_ref().to_string())
        .collect();
    Ok((names, DVector::from_vec(coefficients)))
}
