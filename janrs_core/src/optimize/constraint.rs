//! Provides struct for representing a constraint in an optimization problem
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::optimize::expression::Expression;

/// Represents a linear constraint `expression <relation> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Name of the constraint, used for diagnostics such as the IIS report
    pub(crate) name: String,
    /// Left hand side
    pub(crate) expression: Expression,
    /// Relation between the two sides
    pub(crate) relation: Relation,
    /// Right hand side constant
    pub(crate) rhs: f64,
}

impl Constraint {
    /// Create a new constraint
    pub fn new(name: impl Into<String>, expression: Expression, relation: Relation, rhs: f64) -> Self {
        Constraint {
            name: name.into(),
            expression,
            relation,
            rhs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Right hand side once the constant of the expression is moved across
    pub fn normalized_rhs(&self) -> f64 {
        self.rhs - self.expression.constant()
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {} {}",
            self.name, self.expression, self.relation, self.rhs
        )
    }
}

/// Relational operator of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Left hand side <= right hand side
    LessEqual,
    /// Left hand side = right hand side
    Equal,
    /// Left hand side >= right hand side
    GreaterEqual,
}

impl Relation {
    /// Check whether `lhs <relation> rhs` holds within `tolerance`
    pub fn holds(&self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Relation::LessEqual => lhs <= rhs + tolerance,
            Relation::Equal => (lhs - rhs).abs() <= tolerance,
            Relation::GreaterEqual => lhs >= rhs - tolerance,
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::LessEqual => write!(f, "<="),
            Relation::Equal => write!(f, "="),
            Relation::GreaterEqual => write!(f, ">="),
        }
    }
}

/// Error returned when parsing an unknown relation name
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Unknown constraint relation '{0}'")]
pub struct ParseRelationError(String);

impl FromStr for Relation {
    type Err = ParseRelationError;

    /// Accepts the symbolic form (`<=`, `=`, `>=`) and the spelled out names used by
    /// experiment scripts (`less_equal`, `equal`, `greater_equal`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "<=" | "less_equal" | "le" => Ok(Relation::LessEqual),
            "=" | "==" | "equal" | "eq" => Ok(Relation::Equal),
            ">=" | "greater_equal" | "ge" => Ok(Relation::GreaterEqual),
            _ => Err(ParseRelationError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relations() {
        assert_eq!("less_equal".parse::<Relation>(), Ok(Relation::LessEqual));
        assert_eq!(">=".parse::<Relation>(), Ok(Relation::GreaterEqual));
        assert_eq!("Equal".parse::<Relation>(), Ok(Relation::Equal));
        assert!("between".parse::<Relation>().is_err());
    }

    #[test]
    fn relation_holds_with_tolerance() {
        assert!(Relation::LessEqual.holds(2.0000001, 2., 1e-6));
        assert!(!Relation::LessEqual.holds(2.1, 2., 1e-6));
        assert!(Relation::Equal.holds(1., 1. + 1e-9, 1e-6));
        assert!(Relation::GreaterEqual.holds(3., 2., 0.));
    }

    #[test]
    fn constant_moves_to_rhs() {
        let expr = Expression::from_constant(3.);
        let cons = Constraint::new("c", expr, Relation::LessEqual, 10.);
        assert_eq!(cons.normalized_rhs(), 7.);
    }
}
