//! Exact mixed integer encoding of ReLU networks
//!
//! Every hidden neuron `h = max(0, z)` with pre-activation bounds `[L, U]` is encoded as
//! - `h = 0` when `U <= 0`
//! - `h = z` when `L >= 0`
//! - otherwise with a binary `a`: `h >= z`, `h <= z - L (1 - a)`, `h <= U a`, `h >= 0`
//!
//! The bounds come from interval arithmetic on the input bounds, so all inputs feeding an
//! undecided neuron must be bounded.
use std::sync::Arc;

use tracing::debug;

use crate::optimize::constraint::Relation;
use crate::optimize::problem::Column;
use crate::optimize::variable::VariableType;
use crate::predictive::lowering::{AffineForm, CustomLinearization, LinearInput, LoweringContext, LoweringError};
use crate::predictive::mlp::{Activation, MlpRegressor};
use crate::predictive::PredictiveModel;

/// Big-M encoding of a [`MlpRegressor`] with ReLU or identity hidden activations
#[derive(Debug, Clone)]
pub struct ReluNetworkLinearization {
    network: Arc<MlpRegressor>,
}

impl ReluNetworkLinearization {
    pub fn new(network: Arc<MlpRegressor>) -> Self {
        ReluNetworkLinearization { network }
    }

    pub fn network(&self) -> &MlpRegressor {
        &self.network
    }
}

impl CustomLinearization for ReluNetworkLinearization {
    fn lower(
        &self,
        inputs: &[LinearInput],
        output: Column,
        ctx: &mut LoweringContext<'_>,
    ) -> Result<(), LoweringError> {
        let activation = self.network.activation();
        if !activation.is_piecewise_linear() {
            return Err(LoweringError::UnsupportedActivation(activation.to_string()));
        }
        let expected = self.network.feature_names().len();
        if inputs.len() != expected {
            return Err(LoweringError::DimensionMismatch {
                expected,
                found: inputs.len(),
            });
        }

        let layers = self.network.layers();
        let hidden = layers.len() - 1;
        let mut current = inputs.to_vec();
        let mut binaries = 0;
        for (l, layer) in layers.iter().enumerate() {
            let forms: Vec<AffineForm> = (0..layer.outputs())
                .map(|j| {
                    let weights: Vec<f64> = layer.weights.row(j).iter().copied().collect();
                    AffineForm::combine(&weights, &current, layer.bias[j])
                })
                .collect();
            if l == hidden {
                ctx.add_definition("output", output, &forms[0]);
                break;
            }
            let mut next = Vec::with_capacity(forms.len());
            for (j, form) in forms.iter().enumerate() {
                let neuron = format!("l{}_n{}", l, j);
                let input = match activation {
                    Activation::Relu => {
                        let (value, binary) = relu_neuron(ctx, &neuron, form)?;
                        binaries += binary as usize;
                        value
                    }
                    _ => linear_neuron(ctx, &neuron, form),
                };
                next.push(input);
            }
            current = next;
        }
        debug!(
            variable = ctx.variable(),
            layers = layers.len(),
            binaries,
            "lowered relu network"
        );
        Ok(())
    }
}

/// Column (or constant) equal to `form`
fn linear_neuron(ctx: &mut LoweringContext<'_>, neuron: &str, form: &AffineForm) -> LinearInput {
    if form.is_constant() {
        return LinearInput::Constant(form.constant);
    }
    let column = ctx.add_column(neuron, form.lower, form.upper, VariableType::Continuous);
    ctx.add_definition(&format!("{}_def", neuron), column, form);
    LinearInput::Column {
        column,
        lower: form.lower,
        upper: form.upper,
    }
}

/// Column (or constant) equal to `max(0, form)`, also reports whether a binary was needed
fn relu_neuron(
    ctx: &mut LoweringContext<'_>,
    neuron: &str,
    form: &AffineForm,
) -> Result<(LinearInput, bool), LoweringError> {
    if form.is_constant() {
        return Ok((LinearInput::Constant(form.constant.max(0.)), false));
    }
    if form.upper <= 0. {
        return Ok((LinearInput::Constant(0.), false));
    }
    if form.lower >= 0. {
        return Ok((linear_neuron(ctx, neuron, form), false));
    }
    if !form.is_bounded() {
        return Err(LoweringError::UnboundedInput {
            location: format!("{} neuron {}", ctx.variable(), neuron),
        });
    }

    let (lower, upper) = (form.lower, form.upper);
    let h = ctx.add_column(neuron, 0., upper, VariableType::Continuous);
    let a = ctx.add_column(&format!("{}_active", neuron), 0., 1., VariableType::Binary);
    let mut terms = vec![(h, 1.)];
    terms.extend(form.terms.iter().map(|(c, w)| (*c, -w)));

    // h >= z
    ctx.add_row(
        &format!("{}_lower", neuron),
        terms.clone(),
        Relation::GreaterEqual,
        form.constant,
    );
    // h <= z - L (1 - a)
    let mut upper_terms = terms;
    upper_terms.push((a, -lower));
    ctx.add_row(
        &format!("{}_off", neuron),
        upper_terms,
        Relation::LessEqual,
        form.constant - lower,
    );
    // h <= U a
    ctx.add_row(
        &format!("{}_on", neuron),
        vec![(h, 1.), (a, -upper)],
        Relation::LessEqual,
        0.,
    );
    Ok((
        LinearInput::Column {
            column: h,
            lower: 0.,
            upper,
        },
        true,
    ))
}
