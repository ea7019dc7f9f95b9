//! Boundary to the external solvers
//!
//! A [`SolverAdapter`] receives the lowered [`LinearProblem`] together with the
//! [`SolverParams`] collected on the model, and reports a terminal [`SolveStatus`].
#[cfg(feature = "highs")]
pub mod highs;
#[cfg(feature = "microlp")]
pub mod microlp;

use std::time::Duration;

use thiserror::Error;

use crate::optimize::iis::{deletion_filter, IisReport};
use crate::optimize::params::SolverParams;
use crate::optimize::problem::LinearProblem;
use crate::optimize::SolveStatus;

/// Result of a single solver invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// Terminal status
    pub status: SolveStatus,
    /// Objective value, only present when `status` is optimal
    pub objective_value: Option<f64>,
    /// Column values, only present when `status` is optimal
    pub values: Option<Vec<f64>>,
    /// Time spent inside the solver, as reported by the adapter
    pub solve_time: Duration,
}

impl SolverOutcome {
    /// An outcome without a solution
    pub fn without_solution(status: SolveStatus, solve_time: Duration) -> Self {
        SolverOutcome {
            status,
            objective_value: None,
            values: None,
            solve_time,
        }
    }

    /// An optimal outcome, the objective value is computed from the problem
    pub fn optimal(problem: &LinearProblem, values: Vec<f64>, solve_time: Duration) -> Self {
        SolverOutcome {
            status: SolveStatus::Optimal,
            objective_value: Some(problem.objective_value(&values)),
            values: Some(values),
            solve_time,
        }
    }
}

/// Interface every solver backend implements
pub trait SolverAdapter {
    /// Short name of the backend, used in logs
    fn name(&self) -> &'static str;

    /// Solve the problem with the given options
    fn solve(
        &self,
        problem: &LinearProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, SolverError>;

    /// Compute an irreducible inconsistent subsystem of an infeasible problem
    ///
    /// The default implementation runs a deletion filter over the rows using repeated calls to
    /// [`SolverAdapter::solve`], with at most `max_solves` solver calls. Backends with a native
    /// IIS routine can override it.
    fn compute_iis(
        &self,
        problem: &LinearProblem,
        params: &SolverParams,
        max_solves: usize,
    ) -> Result<IisReport, SolverError> {
        deletion_filter(self, problem, params, max_solves)
    }
}

/// Create the default solver adapter for the enabled features
///
/// HiGHS is preferred when the `highs` feature is enabled, otherwise the pure rust microlp
/// backend is used.
pub fn default_solver() -> Result<Box<dyn SolverAdapter>, SolverError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "highs")] {
            Ok(Box::new(highs::HighsSolver::default()))
        } else if #[cfg(feature = "microlp")] {
            Ok(Box::new(microlp::MicrolpSolver::default()))
        } else {
            Err(SolverError::NoBackend)
        }
    }
}

/// Errors raised by solver adapters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// No solver backend feature was enabled at compile time
    #[error("No solver backend available, enable the `microlp` or `highs` feature")]
    NoBackend,
    /// The backend can't represent the bounds of a column
    #[error("Solver {solver} can't represent bounds [{lower}, {upper}] of column {column}")]
    UnsupportedBounds {
        solver: &'static str,
        column: String,
        lower: f64,
        upper: f64,
    },
    /// The backend failed in an unexpected way
    #[error("Solver backend failure: {0}")]
    Backend(String),
    /// A feasibility probe during IIS computation ended with a status other than optimal or
    /// infeasible
    #[error("Feasibility probe ended with status {0}")]
    InconclusiveProbe(SolveStatus),
    /// An IIS was requested for a problem whose constraints are jointly feasible
    #[error("The constraints are feasible, there is no inconsistent subsystem")]
    FeasibleProblem,
}
