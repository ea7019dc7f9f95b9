//! Irreducible inconsistent subsystem (IIS) computation for infeasible problems
//!
//! The generic routine is a deletion filter: rows are dropped one at a time, and a row stays
//! dropped if the remaining rows are still infeasible. Variable bounds are never dropped, so the
//! result is minimal with respect to the rows given the bounds.
use std::fmt::{Display, Formatter};

use tracing::debug;

use crate::optimize::params::SolverParams;
use crate::optimize::problem::{LinearProblem, RowOrigin};
use crate::optimize::solvers::{SolverAdapter, SolverError};
use crate::optimize::SolveStatus;

/// Membership of one constraint in the computed subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct IisMembership {
    /// Name of the constraint
    pub name: String,
    /// Whether the constraint was added by the caller or generated by lowering
    pub origin: RowOrigin,
    /// Whether the constraint participates in the subsystem
    pub in_iis: bool,
}

/// Result of an IIS computation
///
/// Variable bounds are not part of the subsystem. When the bounds alone are infeasible (an
/// integer column whose bounds contain no integer, for instance) every row gets dropped and the
/// report is empty, see [`IisReport::bounds_only`].
#[derive(Debug, Clone, PartialEq)]
pub struct IisReport {
    /// `true` when every constraint was tested, `false` if the solve budget ran out first (the
    /// subsystem is then infeasible but possibly not minimal)
    pub minimal: bool,
    /// One entry per constraint of the lowered problem, in row order
    pub constraints: Vec<IisMembership>,
    /// Number of solver calls spent
    pub solves: usize,
}

impl IisReport {
    /// Constraints participating in the subsystem
    pub fn iis_constraints(&self) -> impl Iterator<Item = &IisMembership> {
        self.constraints.iter().filter(|c| c.in_iis)
    }

    /// Whether the named constraint participates in the subsystem
    pub fn contains(&self, name: &str) -> bool {
        self.iis_constraints().any(|c| c.name == name)
    }

    /// Number of constraints in the subsystem
    pub fn len(&self) -> usize {
        self.iis_constraints().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the variable bounds are infeasible without any constraint
    ///
    /// Only conclusive for a minimal report.
    pub fn bounds_only(&self) -> bool {
        self.minimal && self.is_empty()
    }
}

impl Display for IisReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.minimal {
            writeln!(f, "IIS is minimal")?;
        } else {
            writeln!(f, "IIS is not minimal")?;
        }
        if self.bounds_only() {
            return writeln!(f, "The variable bounds cannot be satisfied");
        }
        writeln!(f, "The following constraint(s) cannot be satisfied:")?;
        for membership in self.iis_constraints() {
            writeln!(f, "{} ({})", membership.name, membership.origin)?;
        }
        Ok(())
    }
}

/// Run a deletion filter over the rows of `problem` using `solver` for feasibility probes
pub(crate) fn deletion_filter<S: SolverAdapter + ?Sized>(
    solver: &S,
    problem: &LinearProblem,
    params: &SolverParams,
    max_solves: usize,
) -> Result<IisReport, SolverError> {
    let mut keep = vec![true; problem.num_rows()];
    let mut solves = 1;
    if !probe_infeasible(solver, problem, &keep, params)? {
        return Err(SolverError::FeasibleProblem);
    }

    let mut minimal = true;
    for row in 0..keep.len() {
        if solves >= max_solves {
            minimal = false;
            break;
        }
        keep[row] = false;
        solves += 1;
        if !probe_infeasible(solver, problem, &keep, params)? {
            keep[row] = true;
        }
    }
    debug!(
        solver = solver.name(),
        solves,
        minimal,
        size = keep.iter().filter(|k| **k).count(),
        "deletion filter finished"
    );

    let constraints = problem
        .rows
        .iter()
        .zip(&keep)
        .map(|(row, kept)| IisMembership {
            name: row.name.clone(),
            origin: row.origin.clone(),
            in_iis: *kept,
        })
        .collect();
    Ok(IisReport {
        minimal,
        constraints,
        solves,
    })
}

/// Whether the rows selected by `keep` are jointly infeasible
fn probe_infeasible<S: SolverAdapter + ?Sized>(
    solver: &S,
    problem: &LinearProblem,
    keep: &[bool],
    params: &SolverParams,
) -> Result<bool, SolverError> {
    let subproblem = problem.feasibility_subproblem(keep);
    let outcome = solver.solve(&subproblem, params)?;
    match outcome.status {
        SolveStatus::Optimal | SolveStatus::Unbounded => Ok(false),
        // the objective is zero, so "infeasible or unbounded" can only mean infeasible
        SolveStatus::Infeasible | SolveStatus::InfeasibleOrUnbounded => Ok(true),
        status @ SolveStatus::Other(_) => Err(SolverError::InconclusiveProbe(status)),
    }
}

#[cfg(all(test, feature = "microlp"))]
mod tests {
    use super::*;
    use crate::optimize::constraint::Relation;
    use crate::optimize::objective::ObjectiveSense;
    use crate::optimize::solvers::microlp::MicrolpSolver;
    use crate::optimize::variable::VariableType;

    fn conflicting_problem() -> LinearProblem {
        // x + y >= 5 conflicts with x <= 1 and y <= 1, z <= 3 is unrelated
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 10., VariableType::Continuous, 1.);
        let y = problem.add_column("y", 0., 10., VariableType::Continuous, 1.);
        let z = problem.add_column("z", 0., 10., VariableType::Continuous, 1.);
        problem.add_row("z_cap", vec![(z, 1.)], Relation::LessEqual, 3., RowOrigin::User);
        problem.add_row("x_cap", vec![(x, 1.)], Relation::LessEqual, 1., RowOrigin::User);
        problem.add_row(
            "demand",
            vec![(x, 1.), (y, 1.)],
            Relation::GreaterEqual,
            5.,
            RowOrigin::User,
        );
        problem.add_row("y_cap", vec![(y, 1.)], Relation::LessEqual, 1., RowOrigin::User);
        problem
    }

    #[test]
    fn finds_minimal_subsystem() {
        let problem = conflicting_problem();
        let report =
            deletion_filter(&MicrolpSolver::new(), &problem, &SolverParams::default(), 100)
                .unwrap();
        assert!(report.minimal);
        assert_eq!(report.len(), 3);
        assert!(report.contains("x_cap"));
        assert!(report.contains("y_cap"));
        assert!(report.contains("demand"));
        assert!(!report.contains("z_cap"));
        assert_eq!(report.constraints.len(), 4);
    }

    #[test]
    fn budget_limits_solves() {
        let problem = conflicting_problem();
        let report =
            deletion_filter(&MicrolpSolver::new(), &problem, &SolverParams::default(), 2)
                .unwrap();
        assert!(!report.minimal);
        assert_eq!(report.solves, 2);
        // only z_cap has been tested, and dropped
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn feasible_problem_is_an_error() {
        let mut problem = conflicting_problem();
        problem.rows.truncate(2);
        let result =
            deletion_filter(&MicrolpSolver::new(), &problem, &SolverParams::default(), 100);
        assert_eq!(result, Err(SolverError::FeasibleProblem));
    }

    #[test]
    fn display_lists_members() {
        let problem = conflicting_problem();
        let report =
            deletion_filter(&MicrolpSolver::new(), &problem, &SolverParams::default(), 100)
                .unwrap();
        let text = report.to_string();
        assert!(text.starts_with("IIS is minimal"));
        assert!(text.contains("demand (user)"));
        assert!(!text.contains("z_cap"));
    }

    #[test]
    fn infeasible_bounds_give_an_empty_report() {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let n = problem.add_column("n", 0.2, 0.8, VariableType::Integer, 1.);
        problem.add_row("n_cap", vec![(n, 1.)], Relation::LessEqual, 5., RowOrigin::User);
        let report =
            deletion_filter(&MicrolpSolver::new(), &problem, &SolverParams::default(), 100)
                .unwrap();
        assert!(report.is_empty());
        assert!(report.bounds_only());
        assert!(report.to_string().contains("variable bounds"));
        let conflicting =
            deletion_filter(&MicrolpSolver::new(), &conflicting_problem(), &SolverParams::default(), 100)
                .unwrap();
        assert!(!conflicting.bounds_only());
    }
}
