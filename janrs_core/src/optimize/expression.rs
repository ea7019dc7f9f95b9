//! Provides a symbolic linear expression over model variables
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::optimize::variable::VarRef;

/// A linear combination of variables plus a constant offset
///
/// Terms keep the order in which their variable was first added. Adding a variable that is
/// already present accumulates its coefficient.
///
/// # Examples
/// ```rust
/// use janrs_core::{Expression, OptimizationModel};
/// let mut model = OptimizationModel::new();
/// let x = model.add_regular_variables(&[2], "x").unwrap();
/// let mut budget = Expression::new();
/// budget.add_term(x[0], 1.);
/// budget.add_term(x[1], 1.);
/// budget.add_term(x[0], 2.);
/// assert_eq!(budget.coefficient(x[0]), 3.);
/// assert_eq!(budget.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    terms: IndexMap<VarRef, f64>,
    constant: f64,
}

impl Expression {
    /// Create a new empty expression
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an expression holding only a constant
    pub fn from_constant(constant: f64) -> Self {
        Expression {
            terms: IndexMap::new(),
            constant,
        }
    }

    /// Add `coefficient * variable` to the expression
    pub fn add_term(&mut self, variable: VarRef, coefficient: f64) -> &mut Self {
        *self.terms.entry(variable).or_insert(0.) += coefficient;
        self
    }

    /// Add a constant offset to the expression
    pub fn add_constant(&mut self, constant: f64) -> &mut Self {
        self.constant += constant;
        self
    }

    /// Add all terms and the constant of another expression, scaled by `factor`
    pub fn add_expression(&mut self, other: &Expression, factor: f64) -> &mut Self {
        for (var, coef) in other.terms() {
            self.add_term(var, coef * factor);
        }
        self.constant += other.constant * factor;
        self
    }

    /// Terms of the expression, in insertion order
    pub fn terms(&self) -> impl Iterator<Item = (VarRef, f64)> + '_ {
        self.terms.iter().map(|(v, c)| (*v, *c))
    }

    /// Variables referenced by the expression
    pub fn variables(&self) -> impl Iterator<Item = VarRef> + '_ {
        self.terms.keys().copied()
    }

    /// Coefficient of a variable, zero if it does not appear
    pub fn coefficient(&self, variable: VarRef) -> f64 {
        self.terms.get(&variable).copied().unwrap_or(0.)
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Number of distinct variables in the expression
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate the expression, looking up variable values with `value_of`
    pub fn evaluate<F>(&self, mut value_of: F) -> Option<f64>
    where
        F: FnMut(VarRef) -> Option<f64>,
    {
        let mut total = self.constant;
        for (var, coef) in self.terms() {
            total += coef * value_of(var)?;
        }
        Some(total)
    }
}

impl FromIterator<(VarRef, f64)> for Expression {
    fn from_iter<T: IntoIterator<Item = (VarRef, f64)>>(iter: T) -> Self {
        let mut expression = Expression::new();
        for (var, coef) in iter {
            expression.add_term(var, coef);
        }
        expression
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self
            .terms()
            .map(|(v, c)| format!("{}*v{}", c, v.index))
            .collect();
        if self.constant != 0. || parts.is_empty() {
            parts.push(format!("{}", self.constant));
        }
        write!(f, "{}", parts.join(" + "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(index: usize) -> VarRef {
        VarRef { model_id: 0, index }
    }

    #[test]
    fn accumulates_repeated_terms() {
        let mut expr = Expression::new();
        expr.add_term(var(0), 1.5).add_term(var(1), 2.).add_term(var(0), -0.5);
        assert_eq!(expr.len(), 2);
        assert!((expr.coefficient(var(0)) - 1.).abs() < 1e-12);
        assert_eq!(expr.variables().collect::<Vec<_>>(), vec![var(0), var(1)]);
    }

    #[test]
    fn evaluate_with_constant() {
        let mut expr: Expression = vec![(var(0), 2.), (var(1), -1.)].into_iter().collect();
        expr.add_constant(4.);
        let value = expr.evaluate(|v| Some(if v.index == 0 { 3. } else { 1. }));
        assert_eq!(value, Some(9.));
        assert_eq!(expr.evaluate(|_| None), None);
    }

    #[test]
    fn scaled_addition() {
        let mut a = Expression::from_constant(1.);
        a.add_term(var(2), 1.);
        let mut b = Expression::new();
        b.add_expression(&a, -2.);
        assert_eq!(b.coefficient(var(2)), -2.);
        assert_eq!(b.constant(), -2.);
    }
}
