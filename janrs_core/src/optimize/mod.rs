//! Module for constructing and solving optimization problems

pub mod constraint;
pub mod expression;
pub mod iis;
pub mod model;
pub mod objective;
pub mod params;
pub mod problem;
pub mod solvers;
pub mod variable;

use std::fmt::{Display, Formatter};

/// Terminal status reported by a solver adapter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SolveStatus {
    /// An optimal solution was found (within the configured gap)
    Optimal,
    /// Problem can't be solved because it is infeasible (conflicting constraints)
    Infeasible,
    /// Problem can't be optimized because objective value is not bounded
    Unbounded,
    /// The solver proved that the problem is infeasible or unbounded, but not which
    InfeasibleOrUnbounded,
    /// Any other terminal status, carrying the backend's status code
    Other(i32),
}

impl SolveStatus {
    /// Whether the status means no feasible point exists (or may not exist)
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            SolveStatus::Infeasible | SolveStatus::InfeasibleOrUnbounded
        )
    }
}

impl Display for SolveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "OPTIMAL"),
            SolveStatus::Infeasible => write!(f, "INFEASIBLE"),
            SolveStatus::Unbounded => write!(f, "UNBOUNDED"),
            SolveStatus::InfeasibleOrUnbounded => write!(f, "INF_OR_UNBD"),
            SolveStatus::Other(code) => write!(f, "OTHER({})", code),
        }
    }
}
