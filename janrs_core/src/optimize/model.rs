//! Provides the optimization model, which owns variables, constraints and predictive model
//! bindings, lowers them into a [`LinearProblem`] and drives a solver adapter
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::configuration::ModelConfig;
use crate::optimize::constraint::{Constraint, Relation};
use crate::optimize::expression::Expression;
use crate::optimize::iis::IisReport;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::params::{ParamValue, ParamsError, SolverParams};
use crate::optimize::problem::{Column, LinearProblem, RowOrigin};
use crate::optimize::solvers::{default_solver, SolverAdapter, SolverError};
use crate::optimize::variable::{
    member_name, Domain, VarRef, Variable, VariableFamily, VariableKind,
};
use crate::optimize::SolveStatus;
use crate::predictive::binding::{FeatureSource, OptimizationPredictiveModel};
use crate::predictive::lowering::{LinearInput, LoweringContext, LoweringError};
use crate::predictive::PredictiveModelError;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(0);

/// Life cycle of an [`OptimizationModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Nothing has been added yet
    Empty,
    /// Variables or constraints were added since the last lowering
    Building,
    /// The model was lowered into a linear problem, which has not been solved
    Lowered,
    /// The lowered problem was handed to a solver, which reported the status
    Solved(SolveStatus),
}

impl Display for ModelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Empty => write!(f, "EMPTY"),
            ModelState::Building => write!(f, "BUILDING"),
            ModelState::Lowered => write!(f, "LOWERED"),
            ModelState::Solved(status) => write!(f, "SOLVED({})", status),
        }
    }
}

/// A predicted variable's model and the ordered source of each feature
#[derive(Debug, Clone)]
struct PredictedBinding {
    binding: Arc<OptimizationPredictiveModel>,
    sources: Vec<FeatureSource>,
}

/// Result of lowering, kept around for diagnostics
#[derive(Debug, Clone)]
struct Lowering {
    problem: LinearProblem,
    duration: Duration,
    breakpoints: IndexMap<usize, Vec<f64>>,
}

/// An optimization problem over regular and predicted variables
///
/// Predicted variables are tied to the output of a trained model through
/// [`OptimizationModel::set_predictive_model`]. On [`OptimizationModel::solve`] every such
/// binding is lowered into linear (and, for nonlinear models, mixed integer) rows, and the
/// result is handed to a [`SolverAdapter`].
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use janrs_core::predictive::LinearRegression;
/// use janrs_core::{Expression, OptimizationModel, OptimizationPredictiveModel, Relation, SolveStatus};
///
/// let mut model = OptimizationModel::new();
/// let x = model.add_regular_variables(&[1], "merit").unwrap();
/// let p = model.add_predicted_variables(&[1], "enroll").unwrap();
/// model.set_continuous_domain(x[0], 0., 2.5).unwrap();
/// model.set_objective_coefficient(p[0], 1.).unwrap();
///
/// let trained = Arc::new(LinearRegression::new(&["GPA", "merit"], vec![0.2, 0.3], 0.).unwrap());
/// let binding = Arc::new(OptimizationPredictiveModel::new(trained, &["GPA", "merit"]).unwrap());
/// model
///     .set_predictive_model(p[0], binding, [("GPA", 3.5.into()), ("merit", x[0].into())])
///     .unwrap();
///
/// let mut budget = Expression::new();
/// budget.add_term(x[0], 1.);
/// model.add_named_constraint("budget", budget, Relation::LessEqual, 2.).unwrap();
///
/// assert_eq!(model.solve().unwrap(), SolveStatus::Optimal);
/// assert!((model.objective_value().unwrap() - 1.3).abs() < 1e-6);
/// ```
///
/// Variable handles are only valid in the model that created them. A copy of a model would share
/// its identity and accept the handles of the original, so models can't be cloned:
/// ```compile_fail
/// fn copy<T: Clone>(_: &T) {}
/// copy(&janrs_core::OptimizationModel::new());
/// ```
#[derive(Debug)]
pub struct OptimizationModel {
    id: u64,
    config: ModelConfig,
    variables: Vec<Variable>,
    families: IndexMap<String, VariableFamily>,
    constraints: Vec<Constraint>,
    predictive: IndexMap<usize, PredictedBinding>,
    params: SolverParams,
    state: ModelState,
    lowering: Option<Lowering>,
    status: Option<SolveStatus>,
    objective_value: Option<f64>,
    solver_duration: Option<Duration>,
}

impl Default for OptimizationModel {
    fn default() -> Self {
        Self::with_config(ModelConfig::default())
    }
}

impl OptimizationModel {
    // region Creation Functions
    /// Create an empty maximization model with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty model with the given configuration
    pub fn with_config(config: ModelConfig) -> Self {
        OptimizationModel {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            variables: Vec::new(),
            families: IndexMap::new(),
            constraints: Vec::new(),
            predictive: IndexMap::new(),
            params: SolverParams::default(),
            state: ModelState::Empty,
            lowering: None,
            status: None,
            objective_value: None,
            solver_duration: None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
    // endregion Creation Functions

    // region Variables
    /// Add a family of regular variables of the given shape
    ///
    /// Members are named `base_name[i]` (or `base_name[i,j,..]`), start with an unrestricted
    /// continuous domain and a zero objective coefficient.
    pub fn add_regular_variables(
        &mut self,
        shape: &[usize],
        base_name: &str,
    ) -> Result<VariableFamily, ModelError> {
        self.add_family(shape, base_name, VariableKind::Regular)
    }

    /// Add a family of predicted variables of the given shape
    ///
    /// Each member must be bound to a predictive model with
    /// [`OptimizationModel::set_predictive_model`] before solving.
    pub fn add_predicted_variables(
        &mut self,
        shape: &[usize],
        base_name: &str,
    ) -> Result<VariableFamily, ModelError> {
        self.add_family(shape, base_name, VariableKind::Predicted)
    }

    fn add_family(
        &mut self,
        shape: &[usize],
        base_name: &str,
        kind: VariableKind,
    ) -> Result<VariableFamily, ModelError> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(ModelError::InvalidShape(shape.to_vec()));
        }
        if self.families.contains_key(base_name) {
            return Err(ModelError::DuplicateFamily(base_name.to_string()));
        }
        let size: usize = shape.iter().product();
        let mut members = Vec::with_capacity(size);
        for flat in 0..size {
            let index = self.variables.len();
            self.variables.push(Variable::new(
                member_name(base_name, shape, flat),
                base_name.to_string(),
                flat,
                kind,
            ));
            members.push(VarRef {
                model_id: self.id,
                index,
            });
        }
        let family = VariableFamily::new(base_name.to_string(), shape.to_vec(), kind, members);
        self.families.insert(base_name.to_string(), family.clone());
        self.touch();
        debug!(family = base_name, size, %kind, "added variable family");
        Ok(family)
    }

    /// Restrict a variable to the real interval `[lower, upper]`
    pub fn set_continuous_domain(
        &mut self,
        var: VarRef,
        lower: f64,
        upper: f64,
    ) -> Result<(), ModelError> {
        self.set_domain(var, Domain::Continuous { lower, upper })
    }

    /// Restrict a variable to the integers in `[lower, upper]`
    pub fn set_integer_domain(
        &mut self,
        var: VarRef,
        lower: f64,
        upper: f64,
    ) -> Result<(), ModelError> {
        self.set_domain(var, Domain::Integer { lower, upper })
    }

    /// Restrict a variable to {0, 1}
    pub fn set_binary_domain(&mut self, var: VarRef) -> Result<(), ModelError> {
        self.set_domain(var, Domain::Binary)
    }

    fn set_domain(&mut self, var: VarRef, domain: Domain) -> Result<(), ModelError> {
        let index = self.checked_index(var)?;
        let (lower, upper) = domain.bounds();
        // also rejects NaN bounds
        if !(lower <= upper) {
            return Err(ModelError::Domain {
                variable: self.variables[index].name.clone(),
                lower,
                upper,
            });
        }
        self.variables[index].domain = domain;
        self.touch();
        Ok(())
    }

    /// Set the coefficient of a variable in the objective, replacing any previous value
    pub fn set_objective_coefficient(
        &mut self,
        var: VarRef,
        coefficient: f64,
    ) -> Result<(), ModelError> {
        let index = self.checked_index(var)?;
        self.variables[index].objective_coefficient = coefficient;
        self.touch();
        Ok(())
    }

    pub fn set_objective_sense(&mut self, sense: ObjectiveSense) {
        self.config.sense = sense;
        self.touch();
    }

    pub fn objective_sense(&self) -> ObjectiveSense {
        self.config.sense
    }
    // endregion Variables

    // region Predictive Models
    /// Tie a predicted variable to the output of a predictive model
    ///
    /// `mapping` gives the source of every feature in the binding's schema, either a fixed value
    /// or a variable of this model. Binding a variable again replaces the previous binding.
    pub fn set_predictive_model<I, S>(
        &mut self,
        predicted: VarRef,
        binding: Arc<OptimizationPredictiveModel>,
        mapping: I,
    ) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = (S, FeatureSource)>,
        S: Into<String>,
    {
        let index = self.checked_index(predicted)?;
        let variable = &self.variables[index];
        if variable.kind != VariableKind::Predicted {
            return Err(ModelError::WrongVariableKind {
                variable: variable.name.clone(),
                expected: VariableKind::Predicted,
            });
        }
        binding.check_strategy()?;

        let mapping: IndexMap<String, FeatureSource> =
            mapping.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let schema = binding.feature_names();
        let mut sources = Vec::with_capacity(schema.len());
        let mut missing = Vec::new();
        for name in schema {
            match mapping.get(name) {
                Some(source) => sources.push(*source),
                None => missing.push(name.clone()),
            }
        }
        let extra: Vec<String> = mapping
            .keys()
            .filter(|k| !schema.contains(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(ModelError::SchemaMismatch {
                expected: schema.to_vec(),
                missing,
                extra,
            });
        }
        for source in &sources {
            if let FeatureSource::Variable(var) = source {
                self.checked_index(*var)?;
            }
        }

        self.predictive
            .insert(index, PredictedBinding { binding, sources });
        self.touch();
        Ok(())
    }
    // endregion Predictive Models

    // region Constraints
    /// Add the constraint `expression <relation> rhs`, named after its position (`c0`, `c1`, ..)
    pub fn add_constraint(
        &mut self,
        expression: Expression,
        relation: Relation,
        rhs: f64,
    ) -> Result<(), ModelError> {
        let name = format!("c{}", self.constraints.len());
        self.add_named_constraint(&name, expression, relation, rhs)
    }

    /// Add the constraint `expression <relation> rhs` under the given name
    pub fn add_named_constraint(
        &mut self,
        name: &str,
        expression: Expression,
        relation: Relation,
        rhs: f64,
    ) -> Result<(), ModelError> {
        for var in expression.variables() {
            self.checked_index(var)?;
        }
        self.constraints
            .push(Constraint::new(name, expression, relation, rhs));
        self.touch();
        Ok(())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
    // endregion Constraints

    // region Solver Parameters
    /// Set a solver option by name, e.g. `TimeLimit` or `MIPGap`
    pub fn add_param_setting(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ModelError> {
        self.params.set(name, value)?;
        Ok(())
    }

    /// Enable or disable the solver's own log output
    pub fn set_output_flag(&mut self, flag: bool) {
        self.params.output_flag = flag;
    }

    pub fn set_params(&mut self, params: SolverParams) {
        self.params = params;
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }
    // endregion Solver Parameters

    // region Lowering and Solving
    /// Lower the model into a linear problem without solving it
    pub fn lower(&mut self) -> Result<&LinearProblem, ModelError> {
        let lowering = self.build_lowering()?;
        self.clear_solution();
        self.state = ModelState::Lowered;
        Ok(&self.lowering.insert(lowering).problem)
    }

    /// Solve the model with the default solver adapter
    pub fn solve(&mut self) -> Result<SolveStatus, ModelError> {
        let solver = default_solver()?;
        self.solve_with(solver.as_ref())
    }

    /// Solve the model with the given solver adapter
    ///
    /// Infeasible and unbounded problems are reported through the status. A status outside of
    /// the known set is returned as [`ModelError::Solve`].
    pub fn solve_with(&mut self, solver: &dyn SolverAdapter) -> Result<SolveStatus, ModelError> {
        let lowering = self.build_lowering()?;
        let outcome = solver.solve(&lowering.problem, &self.params);
        self.clear_solution();
        self.state = ModelState::Lowered;
        let lowering_duration = lowering.duration;
        self.lowering = Some(lowering);
        let outcome = outcome?;

        let status = outcome.status;
        self.status = Some(status);
        self.solver_duration = Some(outcome.solve_time);
        self.state = ModelState::Solved(status);
        info!(
            solver = solver.name(),
            %status,
            lowering_time = ?lowering_duration,
            solver_time = ?outcome.solve_time,
            "solved model"
        );
        match status {
            SolveStatus::Optimal => {
                if let Some(values) = outcome.values {
                    for (variable, value) in self.variables.iter_mut().zip(values) {
                        variable.value = Some(value);
                    }
                }
                self.objective_value = outcome.objective_value;
                Ok(status)
            }
            SolveStatus::Other(_) => Err(ModelError::Solve { status }),
            _ => Ok(status),
        }
    }

    /// Lower every part of the model, without touching its state
    fn build_lowering(&self) -> Result<Lowering, ModelError> {
        let start = Instant::now();
        let mut problem = LinearProblem::new(self.config.sense);

        for variable in &self.variables {
            let (lower, upper) = variable.bounds();
            problem.add_column(
                variable.name.clone(),
                lower,
                upper,
                variable.domain.variable_type(),
                variable.objective_coefficient,
            );
        }

        for constraint in &self.constraints {
            let terms = constraint
                .expression
                .terms()
                .map(|(var, coef)| (Column(var.index), coef))
                .collect();
            problem.add_row(
                constraint.name.clone(),
                terms,
                constraint.relation,
                constraint.normalized_rhs(),
                RowOrigin::User,
            );
        }

        let mut breakpoints = IndexMap::new();
        for (index, variable) in self.variables.iter().enumerate() {
            if variable.kind != VariableKind::Predicted {
                continue;
            }
            let predicted = self
                .predictive
                .get(&index)
                .ok_or_else(|| ModelError::UnboundPredictedVariable(variable.name.clone()))?;
            let inputs: Vec<LinearInput> = predicted
                .sources
                .iter()
                .map(|source| match *source {
                    FeatureSource::Value(value) => LinearInput::Constant(value),
                    FeatureSource::Variable(var) => {
                        let (lower, upper) = self.variables[var.index].bounds();
                        LinearInput::Column {
                            column: Column(var.index),
                            lower,
                            upper,
                        }
                    }
                })
                .collect();
            let mut ctx = LoweringContext::new(&mut problem, &variable.name, self.config.tolerance);
            let realized = predicted.binding.lower(
                &inputs,
                Column(index),
                &mut ctx,
                self.config.formulation,
            )?;
            if !realized.is_empty() {
                breakpoints.insert(index, realized);
            }
        }

        let duration = start.elapsed();
        debug!(
            columns = problem.num_columns(),
            rows = problem.num_rows(),
            integer = problem.has_integer_columns(),
            elapsed = ?duration,
            "lowered model"
        );
        Ok(Lowering {
            problem,
            duration,
            breakpoints,
        })
    }
    // endregion Lowering and Solving

    // region Infeasibility Diagnostics
    /// Compute an irreducible inconsistent subsystem with the default solver adapter
    pub fn compute_iis(&self) -> Result<IisReport, ModelError> {
        let solver = default_solver()?;
        self.compute_iis_with(solver.as_ref())
    }

    /// Compute an irreducible inconsistent subsystem of the last solved problem
    ///
    /// Only available after a solve that ended infeasible. Works on a copy of the lowered
    /// problem, the model itself is left untouched.
    pub fn compute_iis_with(&self, solver: &dyn SolverAdapter) -> Result<IisReport, ModelError> {
        let lowering = match (self.state, &self.lowering) {
            (ModelState::Solved(status), Some(lowering)) if status.is_infeasible() => lowering,
            _ => return Err(ModelError::IisUnavailable(self.state)),
        };
        let report = solver.compute_iis(&lowering.problem, &self.params, self.config.iis_max_solves)?;
        info!(
            solver = solver.name(),
            size = report.len(),
            minimal = report.minimal,
            solves = report.solves,
            "computed IIS"
        );
        Ok(report)
    }
    // endregion Infeasibility Diagnostics

    // region Accessors
    /// Families of regular variables, in creation order
    pub fn get_regular_variables(&self) -> Vec<&VariableFamily> {
        self.families_of(VariableKind::Regular)
    }

    /// Families of predicted variables, in creation order
    pub fn get_predicted_variables(&self) -> Vec<&VariableFamily> {
        self.families_of(VariableKind::Predicted)
    }

    fn families_of(&self, kind: VariableKind) -> Vec<&VariableFamily> {
        self.families.values().filter(|f| f.kind() == kind).collect()
    }

    pub fn get_number_of_regular_variables(&self) -> usize {
        self.count_of(VariableKind::Regular)
    }

    pub fn get_number_of_predicted_variables(&self) -> usize {
        self.count_of(VariableKind::Predicted)
    }

    fn count_of(&self, kind: VariableKind) -> usize {
        self.variables.iter().filter(|v| v.kind == kind).count()
    }

    /// Family by name
    pub fn family(&self, name: &str) -> Option<&VariableFamily> {
        self.families.get(name)
    }

    pub fn variable(&self, var: VarRef) -> Result<&Variable, ModelError> {
        let index = self.checked_index(var)?;
        Ok(&self.variables[index])
    }

    /// Value of a variable in the last optimal solution
    pub fn value(&self, var: VarRef) -> Result<Option<f64>, ModelError> {
        Ok(self.variable(var)?.value)
    }

    /// Objective value of the last optimal solution
    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    /// Status reported by the last solve
    pub fn status(&self) -> Option<SolveStatus> {
        self.status
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Wall time spent lowering the model for the last solve
    pub fn lowering_duration(&self) -> Option<Duration> {
        self.lowering.as_ref().map(|l| l.duration)
    }

    /// Time the solver adapter reported for the last solve
    pub fn solver_duration(&self) -> Option<Duration> {
        self.solver_duration
    }

    /// Breakpoints used to approximate the model of a predicted variable in the last lowering
    ///
    /// `None` when the model was not lowered yet or its encoding is exact.
    pub fn realized_breakpoints(&self, var: VarRef) -> Result<Option<&[f64]>, ModelError> {
        let index = self.checked_index(var)?;
        Ok(self
            .lowering
            .as_ref()
            .and_then(|l| l.breakpoints.get(&index))
            .map(|b| b.as_slice()))
    }

    /// The last lowered problem
    pub fn lowered_problem(&self) -> Option<&LinearProblem> {
        self.lowering.as_ref().map(|l| &l.problem)
    }

    pub fn number_of_lowered_rows(&self) -> Option<usize> {
        self.lowered_problem().map(|p| p.num_rows())
    }

    pub fn number_of_lowered_columns(&self) -> Option<usize> {
        self.lowered_problem().map(|p| p.num_columns())
    }
    // endregion Accessors

    // region Helpers
    /// Index of a variable of this model
    fn checked_index(&self, var: VarRef) -> Result<usize, ModelError> {
        if var.model_id != self.id || var.index >= self.variables.len() {
            return Err(ModelError::UnknownVariable(var));
        }
        Ok(var.index)
    }

    /// Move back to building after a change, invalidating the last lowering and solution
    fn touch(&mut self) {
        self.state = ModelState::Building;
        self.lowering = None;
        self.clear_solution();
    }

    fn clear_solution(&mut self) {
        for variable in self.variables.iter_mut() {
            variable.value = None;
        }
        self.status = None;
        self.objective_value = None;
        self.solver_duration = None;
    }
    // endregion Helpers
}

/// Errors associated with building and solving an [`OptimizationModel`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The lower bound of a domain exceeds its upper bound
    #[error("Invalid domain [{lower}, {upper}] for variable {variable}")]
    Domain {
        variable: String,
        lower: f64,
        upper: f64,
    },
    /// Feature names don't match the trained model's schema
    #[error("Feature schema mismatch, expected {expected:?} (missing {missing:?}, unexpected {extra:?})")]
    SchemaMismatch {
        expected: Vec<String>,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    /// A variable handle does not belong to this model
    #[error("Variable {0:?} does not belong to this model")]
    UnknownVariable(VarRef),
    /// The predictive model can't be encoded
    #[error("Unsupported predictive model: {0}")]
    UnsupportedModel(String),
    /// The solver ended with a status outside of the known set
    #[error("Solver ended with status {status}")]
    Solve { status: SolveStatus },
    /// A regular variable was used where a predicted one is required, or the reverse
    #[error("Variable {variable} is not {expected}")]
    WrongVariableKind {
        variable: String,
        expected: VariableKind,
    },
    /// A variable family with the same name already exists
    #[error("Variable family {0} already exists")]
    DuplicateFamily(String),
    /// A family shape is empty or has a zero dimension
    #[error("Invalid family shape {0:?}")]
    InvalidShape(Vec<usize>),
    /// A piecewise approximation needs at least two breakpoints
    #[error("Invalid breakpoint count {0}, at least 2 are required")]
    InvalidBreakpoints(usize),
    /// The pre-activation of a predictive model is unbounded, so no breakpoints can be placed
    #[error("Pre-activation of {variable} has unbounded range [{lower}, {upper}], bound its features")]
    UnboundedFeature {
        variable: String,
        lower: f64,
        upper: f64,
    },
    /// A predicted variable has no predictive model
    #[error("Predicted variable {0} has no predictive model")]
    UnboundPredictedVariable(String),
    /// An IIS was requested while the model is not infeasible
    #[error("IIS is only available after an infeasible solve, model is {0}")]
    IisUnavailable(ModelState),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Lowering(#[from] LoweringError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Predictive(#[from] PredictiveModelError),
}
