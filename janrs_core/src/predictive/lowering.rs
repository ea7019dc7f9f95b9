//! Building blocks for translating a predictive model into rows and columns of a
//! [`LinearProblem`]
use std::fmt::Debug;

use indexmap::IndexMap;
use thiserror::Error;

use crate::optimize::constraint::Relation;
use crate::optimize::problem::{Column, LinearProblem, RowOrigin};
use crate::optimize::variable::VariableType;

/// One input of a predictive model, as seen while lowering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearInput {
    /// A fixed data value
    Constant(f64),
    /// A column of the problem, with its bounds
    Column {
        column: Column,
        lower: f64,
        upper: f64,
    },
}

impl LinearInput {
    /// Bounds of the input, a constant is its own bounds
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            LinearInput::Constant(v) => (v, v),
            LinearInput::Column { lower, upper, .. } => (lower, upper),
        }
    }
}

/// An affine function of columns together with bounds on its value
#[derive(Debug, Clone, PartialEq)]
pub struct AffineForm {
    pub terms: Vec<(Column, f64)>,
    pub constant: f64,
    pub lower: f64,
    pub upper: f64,
}

impl AffineForm {
    /// `weights . inputs + intercept`, with bounds computed by interval arithmetic
    ///
    /// A column feeding several inputs gets a single term with the summed weight, so the bounds
    /// stay as tight as interval arithmetic allows.
    pub fn combine(weights: &[f64], inputs: &[LinearInput], intercept: f64) -> Self {
        let mut constant = intercept;
        let mut merged: IndexMap<Column, (f64, f64, f64)> = IndexMap::new();
        for (&w, input) in weights.iter().zip(inputs) {
            if w == 0. {
                continue;
            }
            match *input {
                LinearInput::Constant(v) => constant += w * v,
                LinearInput::Column {
                    column,
                    lower,
                    upper,
                } => {
                    let entry = merged.entry(column).or_insert((0., lower, upper));
                    entry.0 += w;
                    // the same column may carry different bounds, keep the intersection
                    entry.1 = entry.1.max(lower);
                    entry.2 = entry.2.min(upper);
                }
            }
        }
        let mut form = AffineForm {
            terms: Vec::with_capacity(merged.len()),
            constant,
            lower: constant,
            upper: constant,
        };
        for (column, (w, lower, upper)) in merged {
            if w == 0. {
                continue;
            }
            form.terms.push((column, w));
            let (lo, hi) = if w > 0. {
                (w * lower, w * upper)
            } else {
                (w * upper, w * lower)
            };
            form.lower += lo;
            form.upper += hi;
        }
        form
    }

    /// Whether the value does not depend on any column
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether both bounds are finite
    pub fn is_bounded(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }
}

/// Handle used to add the auxiliary columns and rows of one predicted variable
///
/// All names are prefixed with the name of the predicted variable, and every row is tagged with a
/// [`RowOrigin::PredictiveModel`] origin.
#[derive(Debug)]
pub struct LoweringContext<'a> {
    problem: &'a mut LinearProblem,
    prefix: String,
    origin: RowOrigin,
    tolerance: f64,
}

impl<'a> LoweringContext<'a> {
    pub(crate) fn new(problem: &'a mut LinearProblem, variable: &str, tolerance: f64) -> Self {
        LoweringContext {
            problem,
            prefix: variable.to_string(),
            origin: RowOrigin::PredictiveModel {
                variable: variable.to_string(),
            },
            tolerance,
        }
    }

    /// Name of the predicted variable being lowered
    pub fn variable(&self) -> &str {
        &self.prefix
    }

    /// Tolerance below which an interval is treated as a point
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Add an auxiliary column with a zero objective coefficient
    pub fn add_column(
        &mut self,
        suffix: &str,
        lower: f64,
        upper: f64,
        variable_type: VariableType,
    ) -> Column {
        let name = format!("{}_{}", self.prefix, suffix);
        self.problem
            .add_column(name, lower, upper, variable_type, 0.)
    }

    /// Add a row `sum(terms) <relation> rhs`
    pub fn add_row(&mut self, suffix: &str, terms: Vec<(Column, f64)>, relation: Relation, rhs: f64) {
        let name = format!("{}_{}", self.prefix, suffix);
        self.problem
            .add_row(name, terms, relation, rhs, self.origin.clone());
    }

    /// Add the row `target = form`, i.e. `target - form.terms = form.constant`
    pub fn add_definition(&mut self, suffix: &str, target: Column, form: &AffineForm) {
        let mut terms = Vec::with_capacity(form.terms.len() + 1);
        terms.push((target, 1.));
        terms.extend(form.terms.iter().map(|(c, w)| (*c, -w)));
        self.add_row(suffix, terms, Relation::Equal, form.constant);
    }
}

/// A user supplied encoding of a predictive model into linear rows and columns
///
/// Implementations must make the `output` column equal to the model's prediction at `inputs`
/// (exactly, or to an approximation the implementation documents).
pub trait CustomLinearization: Debug + Send + Sync {
    fn lower(
        &self,
        inputs: &[LinearInput],
        output: Column,
        ctx: &mut LoweringContext<'_>,
    ) -> Result<(), LoweringError>;
}

/// Errors raised while lowering a predictive model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoweringError {
    /// The number of inputs does not match the model
    #[error("Expected {expected} inputs, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// A big-M encoding needs finite bounds on a quantity that is unbounded
    #[error("Unbounded pre-activation in {location}, bound the input variables")]
    UnboundedInput { location: String },
    /// The model uses a nonlinearity this linearization can't encode
    #[error("Unsupported activation {0}")]
    UnsupportedActivation(String),
}
