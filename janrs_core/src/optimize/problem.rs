//! Provides the lowered, solver-agnostic form of an optimization model
//!
//! Every model variable becomes one column, in creation order, followed by the auxiliary columns
//! introduced while linearizing predictive models. Every constraint becomes one row.
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::optimize::constraint::Relation;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::variable::VariableType;

/// Index of a column in a [`LinearProblem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column(pub usize);

/// A column of the lowered problem
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    /// Name of the column
    pub name: String,
    /// Lower bound, may be negative infinity
    pub lower: f64,
    /// Upper bound, may be infinity
    pub upper: f64,
    /// Continuous, integer or binary
    pub variable_type: VariableType,
    /// Objective coefficient
    pub objective: f64,
}

/// Where a row of the lowered problem came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowOrigin {
    /// A constraint added by the caller
    User,
    /// A row generated while lowering the predictive model of the named predicted variable
    PredictiveModel {
        /// Name of the predicted variable
        variable: String,
    },
}

impl Display for RowOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RowOrigin::User => write!(f, "user"),
            RowOrigin::PredictiveModel { variable } => write!(f, "predictive model of {}", variable),
        }
    }
}

/// A row of the lowered problem: `sum(coef * column) <relation> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub terms: Vec<(Column, f64)>,
    pub relation: Relation,
    pub rhs: f64,
    pub origin: RowOrigin,
}

impl Row {
    /// Value of the left hand side at `values`
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(col, coef)| coef * values[col.0]).sum()
    }
}

/// A linear (mixed integer) problem ready to hand over to a solver adapter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearProblem {
    /// Sense of the objective
    pub sense: ObjectiveSense,
    /// Columns, model variables first
    pub columns: Vec<ColumnData>,
    /// Rows, user constraints first
    pub rows: Vec<Row>,
}

impl LinearProblem {
    /// Create an empty problem
    pub fn new(sense: ObjectiveSense) -> Self {
        LinearProblem {
            sense,
            ..Default::default()
        }
    }

    /// Add a column and return its index
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        variable_type: VariableType,
        objective: f64,
    ) -> Column {
        self.columns.push(ColumnData {
            name: name.into(),
            lower,
            upper,
            variable_type,
            objective,
        });
        Column(self.columns.len() - 1)
    }

    /// Add a row
    ///
    /// Terms on the same column are merged into one by summing their coefficients, terms whose
    /// coefficient ends up zero are dropped. Backends may reject rows with repeated columns.
    pub fn add_row(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(Column, f64)>,
        relation: Relation,
        rhs: f64,
        origin: RowOrigin,
    ) {
        self.rows.push(Row {
            name: name.into(),
            terms: merge_terms(terms),
            relation,
            rhs,
            origin,
        });
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether any column must take integer values
    pub fn has_integer_columns(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.variable_type != VariableType::Continuous)
    }

    /// Objective value at `values`
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(c, v)| c.objective * v)
            .sum()
    }

    /// Names of rows violated by `values` by more than `tolerance`
    pub fn violated_rows(&self, values: &[f64], tolerance: f64) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| !r.relation.holds(r.activity(values), r.rhs, tolerance))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Copy of the problem with a zero objective, keeping only the rows selected by `keep`
    ///
    /// Used for feasibility checks, where the objective only gets in the way (an unbounded
    /// objective would hide the feasibility answer).
    pub(crate) fn feasibility_subproblem(&self, keep: &[bool]) -> LinearProblem {
        LinearProblem {
            sense: self.sense,
            columns: self
                .columns
                .iter()
                .map(|c| ColumnData {
                    objective: 0.,
                    ..c.clone()
                })
                .collect(),
            rows: self
                .rows
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(r, _)| r.clone())
                .collect(),
        }
    }
}

fn merge_terms(terms: Vec<(Column, f64)>) -> Vec<(Column, f64)> {
    terms
        .into_iter()
        .fold(IndexMap::new(), |mut merged, (column, coefficient)| {
            *merged.entry(column).or_insert(0.) += coefficient;
            merged
        })
        .into_iter()
        .filter(|(_, c)| *c != 0.)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_problem() -> LinearProblem {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let x = problem.add_column("x", 0., 10., VariableType::Continuous, 2.);
        let y = problem.add_column("y", 0., 1., VariableType::Binary, 1.);
        problem.add_row(
            "cap",
            vec![(x, 1.), (y, 3.)],
            Relation::LessEqual,
            5.,
            RowOrigin::User,
        );
        problem.add_row(
            "link",
            vec![(x, 1.), (y, 0.)],
            Relation::GreaterEqual,
            1.,
            RowOrigin::PredictiveModel {
                variable: "p[0]".to_string(),
            },
        );
        problem
    }

    #[test]
    fn zero_coefficients_are_dropped() {
        let problem = small_problem();
        assert_eq!(problem.rows[1].terms.len(), 1);
        assert!(problem.has_integer_columns());
    }

    #[test]
    fn repeated_columns_are_merged() {
        let mut problem = small_problem();
        let (x, y) = (Column(0), Column(1));
        problem.add_row(
            "twice",
            vec![(x, 1.), (y, 2.), (x, 0.5), (y, -2.)],
            Relation::LessEqual,
            3.,
            RowOrigin::User,
        );
        assert_eq!(problem.rows[2].terms, vec![(x, 1.5)]);
        assert_eq!(problem.violated_rows(&[2.1, 0.], 1e-9), vec!["twice"]);
    }

    #[test]
    fn objective_and_violations() {
        let problem = small_problem();
        assert!((problem.objective_value(&[2., 1.]) - 5.).abs() < 1e-12);
        assert_eq!(problem.violated_rows(&[4., 1.], 1e-9), vec!["cap"]);
        assert!(problem.violated_rows(&[2., 1.], 1e-9).is_empty());
    }

    #[test]
    fn feasibility_subproblem_drops_rows_and_objective() {
        let problem = small_problem();
        let sub = problem.feasibility_subproblem(&[false, true]);
        assert_eq!(sub.num_rows(), 1);
        assert_eq!(sub.rows[0].name, "link");
        assert!(sub.columns.iter().all(|c| c.objective == 0.));
    }
}
