//! Implements a solver interface for HiGHS
use std::time::Instant;

use ::highs::{Col, HighsModelStatus, RowProblem, Sense};
use tracing::warn;

use crate::optimize::constraint::Relation;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::params::{ParamValue, SolverParams};
use crate::optimize::problem::LinearProblem;
use crate::optimize::solvers::{SolverAdapter, SolverError, SolverOutcome};
use crate::optimize::variable::VariableType;
use crate::optimize::SolveStatus;

const NAME: &str = "highs";

/// Solver adapter backed by the HiGHS LP/MIP solver
///
/// All typed options are translated into their HiGHS names (`time_limit`, `mip_rel_gap`,
/// `threads`, `output_flag`). Options in `extra` are forwarded when they name a HiGHS option, or a
/// Gurobi parameter with a HiGHS counterpart. Anything else is logged and skipped.
#[derive(Clone, Debug, Default)]
pub struct HighsSolver {}

impl HighsSolver {
    pub fn new() -> Self {
        HighsSolver {}
    }
}

impl SolverAdapter for HighsSolver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn solve(
        &self,
        problem: &LinearProblem,
        params: &SolverParams,
    ) -> Result<SolverOutcome, SolverError> {
        let start = Instant::now();
        let mut native = RowProblem::default();
        let columns: Vec<Col> = problem
            .columns
            .iter()
            .map(|c| match c.variable_type {
                VariableType::Continuous => native.add_column(c.objective, c.lower..=c.upper),
                VariableType::Integer => native.add_integer_column(c.objective, c.lower..=c.upper),
                VariableType::Binary => native.add_integer_column(c.objective, 0. ..=1.),
            })
            .collect();
        for row in &problem.rows {
            let factors: Vec<(Col, f64)> = row
                .terms
                .iter()
                .map(|(column, coefficient)| (columns[column.0], *coefficient))
                .collect();
            match row.relation {
                Relation::LessEqual => native.add_row(..=row.rhs, &factors),
                Relation::Equal => native.add_row(row.rhs..=row.rhs, &factors),
                Relation::GreaterEqual => native.add_row(row.rhs.., &factors),
            };
        }

        let sense = match problem.sense {
            ObjectiveSense::Minimize => Sense::Minimise,
            ObjectiveSense::Maximize => Sense::Maximise,
        };
        let mut model = native.optimise(sense);
        model.set_option("output_flag", params.output_flag);
        if let Some(limit) = params.time_limit {
            model.set_option("time_limit", limit);
        }
        if let Some(gap) = params.mip_gap {
            model.set_option("mip_rel_gap", gap);
        }
        if let Some(threads) = params.threads {
            model.set_option("threads", i32::try_from(threads).unwrap_or(i32::MAX));
        }
        for (name, value) in &params.extra {
            match translate_option(name, value) {
                Some((option, HighsValue::Bool(b))) => model.set_option(option, b),
                Some((option, HighsValue::Int(i))) => model.set_option(option, i),
                Some((option, HighsValue::Float(f))) => model.set_option(option, f),
                Some((option, HighsValue::Text(t))) => model.set_option(option, t.as_str()),
                None => {
                    warn!(solver = NAME, option = %name, value = %value, "unrecognized solver option, ignoring")
                }
            }
        }

        let solved = model
            .try_solve()
            .map_err(|status| SolverError::Backend(format!("{:?}", status)))?;
        let solve_time = start.elapsed();
        let status = match solved.status() {
            HighsModelStatus::Optimal => SolveStatus::Optimal,
            HighsModelStatus::Infeasible => SolveStatus::Infeasible,
            HighsModelStatus::Unbounded => SolveStatus::Unbounded,
            HighsModelStatus::UnboundedOrInfeasible => SolveStatus::InfeasibleOrUnbounded,
            other => SolveStatus::Other(other as i32),
        };
        if status != SolveStatus::Optimal {
            return Ok(SolverOutcome::without_solution(status, solve_time));
        }
        let values = solved.get_solution().columns().to_vec();
        Ok(SolverOutcome::optimal(problem, values, solve_time))
    }
}

// region Options
/// Kind of value a HiGHS option takes
#[derive(Debug, Clone, Copy, PartialEq)]
enum OptionKind {
    Bool,
    Int,
    Float,
    Text,
}

/// HiGHS options accepted in `extra`, HiGHS aborts on names it doesn't know
const HIGHS_OPTIONS: &[(&str, OptionKind)] = &[
    ("presolve", OptionKind::Text),
    ("solver", OptionKind::Text),
    ("parallel", OptionKind::Text),
    ("run_crossover", OptionKind::Text),
    ("time_limit", OptionKind::Float),
    ("threads", OptionKind::Int),
    ("random_seed", OptionKind::Int),
    ("output_flag", OptionKind::Bool),
    ("log_to_console", OptionKind::Bool),
    ("infinite_bound", OptionKind::Float),
    ("objective_bound", OptionKind::Float),
    ("primal_feasibility_tolerance", OptionKind::Float),
    ("dual_feasibility_tolerance", OptionKind::Float),
    ("simplex_strategy", OptionKind::Int),
    ("simplex_iteration_limit", OptionKind::Int),
    ("ipm_iteration_limit", OptionKind::Int),
    ("mip_rel_gap", OptionKind::Float),
    ("mip_abs_gap", OptionKind::Float),
    ("mip_feasibility_tolerance", OptionKind::Float),
    ("mip_heuristic_effort", OptionKind::Float),
    ("mip_max_nodes", OptionKind::Int),
    ("mip_max_leaves", OptionKind::Int),
    ("mip_detection_level", OptionKind::Int),
];

/// Gurobi parameter names with a HiGHS counterpart, keyed by lowercase name
const GUROBI_ALIASES: &[(&str, &str)] = &[
    ("seed", "random_seed"),
    ("mipgapabs", "mip_abs_gap"),
    ("feasibilitytol", "primal_feasibility_tolerance"),
    ("optimalitytol", "dual_feasibility_tolerance"),
    ("intfeastol", "mip_feasibility_tolerance"),
    ("nodelimit", "mip_max_nodes"),
    ("iterationlimit", "simplex_iteration_limit"),
];

/// A value ready for `Model::set_option`
#[derive(Debug, Clone, PartialEq)]
enum HighsValue {
    Bool(bool),
    Int(i32),
    Float(f64),
    Text(String),
}

/// Resolve `name` to a HiGHS option and convert `value` to the type HiGHS expects
///
/// Returns `None` for unknown names and for values of the wrong type, setting either would abort
/// the solve.
fn translate_option(name: &str, value: &ParamValue) -> Option<(&'static str, HighsValue)> {
    let lowered = name.to_ascii_lowercase();
    let option = GUROBI_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, option)| *option)
        .unwrap_or(lowered.as_str());
    let &(option, kind) = HIGHS_OPTIONS.iter().find(|(o, _)| *o == option)?;
    // Gurobi's Presolve takes -1..2, HiGHS a string
    if option == "presolve" {
        return match value {
            ParamValue::Text(t) => Some((option, HighsValue::Text(t.clone()))),
            ParamValue::Int(0) => Some((option, HighsValue::Text("off".to_string()))),
            ParamValue::Int(-1) => Some((option, HighsValue::Text("choose".to_string()))),
            ParamValue::Int(1 | 2) => Some((option, HighsValue::Text("on".to_string()))),
            _ => None,
        };
    }
    let converted = match kind {
        OptionKind::Bool => HighsValue::Bool(value.as_bool()?),
        OptionKind::Int => HighsValue::Int(i32::try_from(value.as_i64()?).ok()?),
        OptionKind::Float => HighsValue::Float(value.as_f64()?),
        OptionKind::Text => match value {
            ParamValue::Text(t) => HighsValue::Text(t.clone()),
            _ => return None,
        },
    };
    Some((option, converted))
}
// endregion Options

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::problem::RowOrigin;

    #[test]
    fn solve_small_mip() {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 1., VariableType::Binary, 1.);
        let y = problem.add_column("y", 0., 10., VariableType::Continuous, 0.5);
        problem.add_row("a", vec![(x, 1.), (y, 1.)], Relation::LessEqual, 3., RowOrigin::User);
        let outcome = HighsSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.objective_value.unwrap() - 2.).abs() < 1e-6);
    }

    #[test]
    fn reports_infeasible() {
        let mut problem = LinearProblem::new(ObjectiveSense::Minimize);
        let x = problem.add_column("x", 0., 1., VariableType::Continuous, 1.);
        problem.add_row("a", vec![(x, 1.)], Relation::GreaterEqual, 2., RowOrigin::User);
        let outcome = HighsSolver::new()
            .solve(&problem, &SolverParams::default())
            .unwrap();
        assert!(outcome.status.is_infeasible());
    }

    #[test]
    fn options_are_translated() {
        assert_eq!(
            translate_option("mip_max_nodes", &ParamValue::Int(50)),
            Some(("mip_max_nodes", HighsValue::Int(50)))
        );
        assert_eq!(
            translate_option("FeasibilityTol", &ParamValue::Float(1e-7)),
            Some(("primal_feasibility_tolerance", HighsValue::Float(1e-7)))
        );
        assert_eq!(
            translate_option("Presolve", &ParamValue::Int(0)),
            Some(("presolve", HighsValue::Text("off".to_string())))
        );
        assert_eq!(
            translate_option("log_to_console", &ParamValue::Int(1)),
            Some(("log_to_console", HighsValue::Bool(true)))
        );
    }

    #[test]
    fn unknown_or_mistyped_options_are_skipped() {
        assert_eq!(translate_option("DUALREDUCTIONS", &ParamValue::Int(0)), None);
        assert_eq!(
            translate_option("mip_max_nodes", &ParamValue::Text("many".to_string())),
            None
        );
        assert_eq!(translate_option("threads", &ParamValue::Int(1 << 40)), None);
    }

    #[test]
    fn solve_with_foreign_options() {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 2., VariableType::Continuous, 1.);
        problem.add_row("a", vec![(x, 1.)], Relation::LessEqual, 1., RowOrigin::User);
        let mut params = SolverParams::default();
        params.set("DUALREDUCTIONS", 0).unwrap();
        params.set("Seed", 3).unwrap();
        let outcome = HighsSolver::new().solve(&problem, &params).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert!((outcome.objective_value.unwrap() - 1.).abs() < 1e-6);
    }
}
