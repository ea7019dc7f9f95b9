//! Binding of a trained predictive model to the variables of an optimization model
use std::sync::Arc;

use tracing::debug;

use crate::optimize::constraint::Relation;
use crate::optimize::model::ModelError;
use crate::optimize::problem::Column;
use crate::optimize::variable::{VarRef, VariableType};
use crate::predictive::lowering::{AffineForm, CustomLinearization, LinearInput, LoweringContext, LoweringError};
use crate::predictive::piecewise::{encode, uniform_breakpoints, PiecewiseFormulation};
use crate::predictive::{ModelStructure, PredictiveModel};

/// Where the value of one model feature comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureSource {
    /// A fixed data value
    Value(f64),
    /// A decision variable of the model
    Variable(VarRef),
}

impl From<f64> for FeatureSource {
    fn from(value: f64) -> Self {
        FeatureSource::Value(value)
    }
}

impl From<VarRef> for FeatureSource {
    fn from(variable: VarRef) -> Self {
        FeatureSource::Variable(variable)
    }
}

/// A trained predictive model prepared for embedding in an optimization model
///
/// One binding can be shared (through an [`Arc`]) by many predicted variables, each with its own
/// feature mapping.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use janrs_core::predictive::{LogisticRegression, OptimizationPredictiveModel};
///
/// let trained = Arc::new(LogisticRegression::new(&["x"], vec![1.], 0.).unwrap());
/// let mut binding = OptimizationPredictiveModel::new(trained, &["x"]).unwrap();
/// binding.set_breakpoints(25).unwrap();
/// assert_eq!(binding.get_breakpoints(), Some(25));
/// ```
#[derive(Debug, Clone)]
pub struct OptimizationPredictiveModel {
    model: Arc<dyn PredictiveModel>,
    breakpoints: Option<usize>,
    formulation: Option<PiecewiseFormulation>,
    linearization: Option<Arc<dyn CustomLinearization>>,
}

impl OptimizationPredictiveModel {
    /// Wrap a trained model, `feature_names` must match the model's schema including its order
    pub fn new<S: AsRef<str>>(
        model: Arc<dyn PredictiveModel>,
        feature_names: &[S],
    ) -> Result<Self, ModelError> {
        let expected = model.feature_names();
        let matches = expected.len() == feature_names.len()
            && expected
                .iter()
                .zip(feature_names)
                .all(|(e, f)| e == f.as_ref());
        if !matches {
            let given: Vec<&str> = feature_names.iter().map(|f| f.as_ref()).collect();
            return Err(ModelError::SchemaMismatch {
                expected: expected.to_vec(),
                missing: expected
                    .iter()
                    .filter(|e| !given.contains(&e.as_str()))
                    .cloned()
                    .collect(),
                extra: given
                    .iter()
                    .filter(|g| !expected.iter().any(|e| e == *g))
                    .map(|g| g.to_string())
                    .collect(),
            });
        }
        Ok(OptimizationPredictiveModel {
            model,
            breakpoints: None,
            formulation: None,
            linearization: None,
        })
    }

    /// Attach a custom linearization, used in place of the model's own structure
    pub fn with_linearization(mut self, linearization: Arc<dyn CustomLinearization>) -> Self {
        self.linearization = Some(linearization);
        self
    }

    pub fn model(&self) -> &Arc<dyn PredictiveModel> {
        &self.model
    }

    /// Ordered feature schema
    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    /// Number of breakpoints used to approximate a nonlinear link, at least 2
    pub fn set_breakpoints(&mut self, breakpoints: usize) -> Result<(), ModelError> {
        if breakpoints < 2 {
            return Err(ModelError::InvalidBreakpoints(breakpoints));
        }
        self.breakpoints = Some(breakpoints);
        Ok(())
    }

    pub fn get_breakpoints(&self) -> Option<usize> {
        self.breakpoints
    }

    /// Override the model-wide piecewise formulation for this binding
    pub fn set_formulation(&mut self, formulation: PiecewiseFormulation) {
        self.formulation = Some(formulation);
    }

    pub fn formulation(&self) -> Option<PiecewiseFormulation> {
        self.formulation
    }

    pub fn has_custom_linearization(&self) -> bool {
        self.linearization.is_some()
    }

    /// Check that the binding knows how to encode the model
    pub fn check_strategy(&self) -> Result<(), ModelError> {
        if self.linearization.is_some() {
            return Ok(());
        }
        match self.model.structure() {
            ModelStructure::Affine { .. } => Ok(()),
            ModelStructure::ScalarLink { link, .. } => match self.breakpoints {
                Some(_) => Ok(()),
                None => Err(ModelError::UnsupportedModel(format!(
                    "a {} link needs a breakpoint count for its piecewise approximation",
                    link
                ))),
            },
            ModelStructure::Opaque => Err(ModelError::UnsupportedModel(
                "the model exposes no linear structure, attach a custom linearization".to_string(),
            )),
        }
    }

    /// Encode `output = model(inputs)` into the problem behind `ctx`
    ///
    /// `inputs` are ordered as the feature schema. Returns the breakpoints used for a piecewise
    /// approximation, empty when the encoding is exact.
    pub(crate) fn lower(
        &self,
        inputs: &[LinearInput],
        output: Column,
        ctx: &mut LoweringContext<'_>,
        default_formulation: PiecewiseFormulation,
    ) -> Result<Vec<f64>, ModelError> {
        let expected = self.feature_names().len();
        if inputs.len() != expected {
            return Err(LoweringError::DimensionMismatch {
                expected,
                found: inputs.len(),
            }
            .into());
        }
        if let Some(linearization) = &self.linearization {
            linearization.lower(inputs, output, ctx)?;
            debug!(variable = ctx.variable(), "applied custom linearization");
            return Ok(Vec::new());
        }
        self.check_strategy()?;

        match self.model.structure() {
            ModelStructure::Affine { weights, intercept } => {
                let form = AffineForm::combine(weights, inputs, intercept);
                ctx.add_definition("prediction", output, &form);
                debug!(variable = ctx.variable(), terms = form.terms.len(), "lowered affine model");
                Ok(Vec::new())
            }
            ModelStructure::ScalarLink {
                weights,
                intercept,
                link,
            } => {
                let count = self.breakpoints.unwrap_or(2);
                let form = AffineForm::combine(weights, inputs, intercept);
                if !form.is_bounded() {
                    return Err(ModelError::UnboundedFeature {
                        variable: ctx.variable().to_string(),
                        lower: form.lower,
                        upper: form.upper,
                    });
                }
                if form.upper - form.lower <= ctx.tolerance() {
                    let value = link.apply(form.lower);
                    ctx.add_row(
                        "prediction",
                        vec![(output, 1.)],
                        Relation::Equal,
                        value,
                    );
                    debug!(variable = ctx.variable(), value, "pre-activation interval is a point");
                    return Ok(vec![form.lower]);
                }
                let preactivation = ctx.add_column(
                    "preactivation",
                    form.lower,
                    form.upper,
                    VariableType::Continuous,
                );
                ctx.add_definition("preactivation_link", preactivation, &form);
                let breakpoints = uniform_breakpoints(form.lower, form.upper, count);
                let values: Vec<f64> = breakpoints.iter().map(|t| link.apply(*t)).collect();
                let formulation = self.formulation.unwrap_or(default_formulation);
                encode(ctx, preactivation, output, &breakpoints, &values, formulation);
                debug!(
                    variable = ctx.variable(),
                    breakpoints = count,
                    %formulation,
                    lower = form.lower,
                    upper = form.upper,
                    "lowered piecewise-linear link"
                );
                Ok(breakpoints)
            }
            // check_strategy rejects opaque models without a linearization
            ModelStructure::Opaque => Err(ModelError::UnsupportedModel(
                "the model exposes no linear structure".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::objective::ObjectiveSense;
    use crate::optimize::problem::LinearProblem;
    use crate::predictive::{Activation, DenseLayer, LinearRegression, LogisticRegression, MlpRegressor};

    fn linear() -> Arc<dyn PredictiveModel> {
        Arc::new(LinearRegression::new(&["SAT", "GPA", "merit"], vec![0.1, 0.2, 0.3], 0.).unwrap())
    }

    fn logistic() -> Arc<dyn PredictiveModel> {
        Arc::new(LogisticRegression::new(&["x", "bias"], vec![1., 0.5], 0.).unwrap())
    }

    #[test]
    fn schema_must_match_in_order() {
        assert!(OptimizationPredictiveModel::new(linear(), &["SAT", "GPA", "merit"]).is_ok());
        match OptimizationPredictiveModel::new(linear(), &["SAT", "merit"]) {
            Err(ModelError::SchemaMismatch { missing, extra, .. }) => {
                assert_eq!(missing, vec!["GPA".to_string()]);
                assert!(extra.is_empty());
            }
            other => panic!("Unexpected result {:?}", other),
        }
        match OptimizationPredictiveModel::new(linear(), &["GPA", "SAT", "merit"]) {
            Err(ModelError::SchemaMismatch { missing, extra, expected }) => {
                assert!(missing.is_empty() && extra.is_empty());
                assert_eq!(expected[0], "SAT");
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn breakpoints_need_two_points() {
        let mut binding = OptimizationPredictiveModel::new(logistic(), &["x", "bias"]).unwrap();
        assert_eq!(binding.get_breakpoints(), None);
        assert!(matches!(
            binding.set_breakpoints(1),
            Err(ModelError::InvalidBreakpoints(1))
        ));
        assert!(matches!(binding.check_strategy(), Err(ModelError::UnsupportedModel(_))));
        binding.set_breakpoints(5).unwrap();
        assert_eq!(binding.get_breakpoints(), Some(5));
        assert!(binding.check_strategy().is_ok());
    }

    #[test]
    fn opaque_models_need_a_linearization() {
        let layer = DenseLayer::from_rows(&[vec![1.]], vec![0.]).unwrap();
        let network: Arc<dyn PredictiveModel> =
            Arc::new(MlpRegressor::new(&["x"], vec![layer], Activation::Relu).unwrap());
        let binding = OptimizationPredictiveModel::new(network, &["x"]).unwrap();
        assert!(!binding.has_custom_linearization());
        assert!(matches!(binding.check_strategy(), Err(ModelError::UnsupportedModel(_))));
    }

    #[test]
    fn affine_lowering_moves_constants_to_the_rhs() {
        let binding = OptimizationPredictiveModel::new(linear(), &["SAT", "GPA", "merit"]).unwrap();
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let p = problem.add_column("p", f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous, 1.);
        let merit = problem.add_column("merit", 0., 2.5, VariableType::Continuous, 0.);
        let inputs = [
            LinearInput::Constant(10.),
            LinearInput::Constant(3.),
            LinearInput::Column {
                column: merit,
                lower: 0.,
                upper: 2.5,
            },
        ];
        let mut ctx = LoweringContext::new(&mut problem, "p", 1e-9);
        let breakpoints = binding
            .lower(&inputs, p, &mut ctx, PiecewiseFormulation::Sos2)
            .unwrap();
        assert!(breakpoints.is_empty());
        assert_eq!(problem.num_rows(), 1);
        let row = &problem.rows[0];
        assert_eq!(row.relation, Relation::Equal);
        assert_eq!(row.terms, vec![(p, 1.), (merit, -0.3)]);
        assert!((row.rhs - 1.6).abs() < 1e-12);
    }

    #[test]
    fn logistic_lowering_spans_the_preactivation_interval() {
        let mut binding = OptimizationPredictiveModel::new(logistic(), &["x", "bias"]).unwrap();
        binding.set_breakpoints(5).unwrap();
        binding.set_formulation(PiecewiseFormulation::ConvexCombination);
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let p = problem.add_column("p", f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous, 1.);
        let x = problem.add_column("x", -4., 4., VariableType::Continuous, 0.);
        let inputs = [
            LinearInput::Column {
                column: x,
                lower: -4.,
                upper: 4.,
            },
            LinearInput::Constant(2.),
        ];
        let mut ctx = LoweringContext::new(&mut problem, "p", 1e-9);
        let breakpoints = binding
            .lower(&inputs, p, &mut ctx, PiecewiseFormulation::Sos2)
            .unwrap();
        assert_eq!(breakpoints, vec![-3., -1., 1., 3., 5.]);
        // no binaries with the convex combination formulation
        assert!(!problem.has_integer_columns());
        assert_eq!(problem.columns[2].name, "p_preactivation");
    }

    #[test]
    fn degenerate_interval_fixes_the_prediction() {
        let mut binding = OptimizationPredictiveModel::new(logistic(), &["x", "bias"]).unwrap();
        binding.set_breakpoints(5).unwrap();
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let p = problem.add_column("p", f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous, 1.);
        let inputs = [LinearInput::Constant(0.), LinearInput::Constant(0.)];
        let mut ctx = LoweringContext::new(&mut problem, "p", 1e-9);
        binding
            .lower(&inputs, p, &mut ctx, PiecewiseFormulation::Sos2)
            .unwrap();
        assert_eq!(problem.num_rows(), 1);
        assert_eq!(problem.rows[0].rhs, 0.5);
    }

    #[test]
    fn unbounded_features_are_rejected() {
        let mut binding = OptimizationPredictiveModel::new(logistic(), &["x", "bias"]).unwrap();
        binding.set_breakpoints(5).unwrap();
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let p = problem.add_column("p", f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous, 1.);
        let x = problem.add_column("x", 0., f64::INFINITY, VariableType::Continuous, 0.);
        let inputs = [
            LinearInput::Column {
                column: x,
                lower: 0.,
                upper: f64::INFINITY,
            },
            LinearInput::Constant(0.),
        ];
        let mut ctx = LoweringContext::new(&mut problem, "p", 1e-9);
        let result = binding.lower(&inputs, p, &mut ctx, PiecewiseFormulation::Sos2);
        assert!(matches!(result, Err(ModelError::UnboundedFeature { .. })));
    }
}
