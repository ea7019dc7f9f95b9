//! Provides the sense of an optimization problem's objective

use serde::{Deserialize, Serialize};

/// Represents the sense of the objective, whether it should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveSense {
    /// The objective should be minimized
    Minimize,
    /// The objective should be maximized
    #[default]
    Maximize,
}

impl ObjectiveSense {
    /// Whether `candidate` is a strictly better objective value than `incumbent`
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ObjectiveSense::Minimize => candidate < incumbent,
            ObjectiveSense::Maximize => candidate > incumbent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_maximize() {
        assert_eq!(ObjectiveSense::default(), ObjectiveSense::Maximize);
    }

    #[test]
    fn better_depends_on_sense() {
        assert!(ObjectiveSense::Maximize.is_better(2., 1.));
        assert!(ObjectiveSense::Minimize.is_better(1., 2.));
        assert!(!ObjectiveSense::Minimize.is_better(2., 2.));
    }
}
