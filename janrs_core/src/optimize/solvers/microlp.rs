//! Implements a solver interface for microlp, a pure rust LP solver with branch and bound for
//! integer variables
use std::time::Instant;

use ::microlp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};
use tracing::{debug, warn};

use crate::optimize::constraint::Relation;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::params::SolverParams;
use crate::optimize::problem::{ColumnData, LinearProblem};
use crate::optimize::solvers::{SolverAdapter, SolverError, SolverOutcome};
use crate::optimize::variable::VariableType;
use crate::optimize::SolveStatus;

const NAME: &str = "microlp";

/// Solver adapter backed by microlp
///
/// microlp has no time limit, gap or thread options. They are accepted and logged, never
/// rejected.
#[derive(Clone, Debug, Default)]
pub struct MicrolpSolver {}

impl MicrolpSolver {
    pub fn new() -> Self {
        MicrolpSolver {}
    }

    fn report_ignored_options(params: &SolverParams) {
        if let Some(limit) = params.time_limit {
            debug!(solver = NAME, time_limit = limit, "time limit is not supported, ignoring");
        }
        if let Some(gap) = params.mip_gap {
            debug!(solver = NAME, mip_gap = gap, "MIP gap is not supported, ignoring");
        }
        if let Some(threads) = params.threads {
            debug!(solver = NAME, threads, "thread count is not supported, ignoring");
        }
        for name in params.extra.keys() {
            warn!(solver = NAME, option = %name, "unrecognized solver option, ignoring");
        }
    }
}

impl SolverAdapter for MicrolpSolver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn solve(
        &self,
        problem: &LinearProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, SolverError> {
        Self::report_ignored_options(params);
        let start = Instant::now();
        if problem.columns.is_empty() {
            return Ok(SolverOutcome::optimal(problem, Vec::new(), start.elapsed()));
        }

        let direction = match problem.sense {
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
        };
        let mut native = Problem::new(direction);
        let mut variables = Vec::with_capacity(problem.num_columns());
        for column in &problem.columns {
            let variable = match column.variable_type {
                VariableType::Continuous => {
                    native.add_var(column.objective, (column.lower, column.upper))
                }
                VariableType::Integer => match integer_bounds(column)? {
                    Some(bounds) => native.add_integer_var(column.objective, bounds),
                    // no integer inside the bounds
                    None => {
                        return Ok(SolverOutcome::without_solution(
                            SolveStatus::Infeasible,
                            start.elapsed(),
                        ))
                    }
                },
                VariableType::Binary => native.add_integer_var(column.objective, (0, 1)),
            };
            variables.push(variable);
        }
        for row in &problem.rows {
            let mut expression = LinearExpr::empty();
            for (column, coefficient) in &row.terms {
                expression.add(variables[column.0], *coefficient);
            }
            let op = match row.relation {
                Relation::LessEqual => ComparisonOp::Le,
                Relation::Equal => ComparisonOp::Eq,
                Relation::GreaterEqual => ComparisonOp::Ge,
            };
            native.add_constraint(expression, op, row.rhs);
        }

        let result = native.solve();
        let solve_time = start.elapsed();
        match result {
            Ok(solution) => {
                let values = variables.iter().map(|v| solution[*v]).collect();
                Ok(SolverOutcome::optimal(problem, values, solve_time))
            }
            Err(::microlp::Error::Infeasible) => Ok(SolverOutcome::without_solution(
                SolveStatus::Infeasible,
                solve_time,
            )),
            Err(::microlp::Error::Unbounded) => Ok(SolverOutcome::without_solution(
                SolveStatus::Unbounded,
                solve_time,
            )),
            Err(other) => Err(SolverError::Backend(other.to_string())),
        }
    }
}

/// Integer range covered by the bounds of an integer column, `None` when it is empty
fn integer_bounds(column: &ColumnData) -> Result<Option<(i32, i32)>, SolverError> {
    const EPS: f64 = 1e-9;
    let (lower, upper) = ((column.lower - EPS).ceil(), (column.upper + EPS).floor());
    for bound in [lower, upper] {
        if !bound.is_finite() || bound.abs() > i32::MAX as f64 {
            return Err(SolverError::UnsupportedBounds {
                solver: NAME,
                column: column.name.clone(),
                lower: column.lower,
                upper: column.upper,
            });
        }
    }
    if lower > upper {
        return Ok(None);
    }
    Ok(Some((lower as i32, upper as i32)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::problem::RowOrigin;

    #[test]
    fn solve_small_lp() {
        // max 3x + 2y s.t. x + y <= 4, x + 3y <= 6, x <= 3
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 3., VariableType::Continuous, 3.);
        let y = problem.add_column("y", 0., f64::INFINITY, VariableType::Continuous, 2.);
        problem.add_row("a", vec![(x, 1.), (y, 1.)], Relation::LessEqual, 4., RowOrigin::User);
        problem.add_row("b", vec![(x, 1.), (y, 3.)], Relation::LessEqual, 6., RowOrigin::User);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.objective_value.unwrap() - 11.).abs() < 1e-6);
        let values = outcome.values.unwrap();
        assert!((values[0] - 3.).abs() < 1e-6);
        assert!((values[1] - 1.).abs() < 1e-6);
    }

    #[test]
    fn solve_small_mip() {
        // max x + y s.t. 2x + 2y <= 3 with x, y binary
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 1., VariableType::Binary, 1.);
        let y = problem.add_column("y", 0., 1., VariableType::Binary, 1.);
        problem.add_row("a", vec![(x, 2.), (y, 2.)], Relation::LessEqual, 3., RowOrigin::User);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.objective_value.unwrap() - 1.).abs() < 1e-6);
    }

    #[test]
    fn reports_infeasible_and_unbounded() {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 1., VariableType::Continuous, 1.);
        problem.add_row("a", vec![(x, 1.)], Relation::GreaterEqual, 2., RowOrigin::User);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());

        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., f64::INFINITY, VariableType::Continuous, 1.);
        problem.add_row("a", vec![(x, 1.)], Relation::GreaterEqual, 2., RowOrigin::User);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Unbounded);
    }

    #[test]
    fn infinite_integer_bounds_are_rejected() {
        let mut problem = LinearProblem::new(ObjectiveSense::Minimize);
        problem.add_column("n", 0., f64::INFINITY, VariableType::Integer, 1.);
        let result = MicrolpSolver::new().solve(&problem, &SolverParams::default());
        assert!(matches!(result, Err(SolverError::UnsupportedBounds { .. })));
    }

    #[test]
    fn fractional_integer_bounds_are_tightened() {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        problem.add_column("n", 0.5, 2.7, VariableType::Integer, 1.);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert!((outcome.objective_value.unwrap() - 2.).abs() < 1e-6);

        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        problem.add_column("n", 0.2, 0.8, VariableType::Integer, 1.);
        let outcome = MicrolpSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }
}
