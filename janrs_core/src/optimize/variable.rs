//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};
use std::ops::Index;

/// Handle to a variable owned by an [`OptimizationModel`](crate::optimize::model::OptimizationModel)
///
/// Handles are cheap to copy. They carry the id of the model that created them, so passing a
/// handle into a different model is detected rather than silently aliasing another variable.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarRef {
    pub(crate) model_id: u64,
    pub(crate) index: usize,
}

impl VarRef {
    /// Position of the variable within its model (creation order)
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A decision variable in an optimization model
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Unique name, derived from the family name and position (e.g. `x[3]`)
    pub(crate) name: String,
    /// Name of the family this variable was created in
    pub(crate) family: String,
    /// Index within the family (flattened, row-major)
    pub(crate) family_index: usize,
    /// Regular or predicted
    pub(crate) kind: VariableKind,
    /// Domain of the variable
    pub(crate) domain: Domain,
    /// Coefficient of this variable in the model objective
    pub(crate) objective_coefficient: f64,
    /// Value at the optimum, only present after a successful solve
    pub(crate) value: Option<f64>,
}

impl Variable {
    /// Create a new variable with an unrestricted continuous domain and zero objective coefficient
    pub(crate) fn new(name: String, family: String, family_index: usize, kind: VariableKind) -> Self {
        Variable {
            name,
            family,
            family_index,
            kind,
            domain: Domain::unrestricted(),
            objective_coefficient: 0.,
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn family_index(&self) -> usize {
        self.family_index
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn objective_coefficient(&self) -> f64 {
        self.objective_coefficient
    }

    /// Value of the variable at the optimum
    ///
    /// `None` unless the last solve of the owning model finished with an optimal status
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Lower and upper bound implied by the domain
    pub fn bounds(&self) -> (f64, f64) {
        self.domain.bounds()
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.domain.variable_type())
    }
}

/// Whether a variable is a plain decision variable or is defined by a predictive model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// A decision variable chosen freely by the solver (within its domain)
    Regular,
    /// A variable whose value is tied to the output of a predictive model
    Predicted,
}

impl Display for VariableKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableKind::Regular => write!(f, "REGULAR"),
            VariableKind::Predicted => write!(f, "PREDICTED"),
        }
    }
}

/// Domain of a variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    /// Real valued variable in `[lower, upper]`, bounds may be infinite
    Continuous { lower: f64, upper: f64 },
    /// Integer valued variable in `[lower, upper]`
    Integer { lower: f64, upper: f64 },
    /// Variable taking values in {0, 1}
    Binary,
}

impl Domain {
    /// Continuous domain over the whole real line
    pub fn unrestricted() -> Self {
        Domain::Continuous {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Lower and upper bound of the domain
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Domain::Continuous { lower, upper } | Domain::Integer { lower, upper } => {
                (lower, upper)
            }
            Domain::Binary => (0., 1.),
        }
    }

    /// The variable type a solver should use for this domain
    pub fn variable_type(&self) -> VariableType {
        match self {
            Domain::Continuous { .. } => VariableType::Continuous,
            Domain::Integer { .. } => VariableType::Integer,
            Domain::Binary => VariableType::Binary,
        }
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// Not all variable types are supported for all solvers, see the individual solver adapters
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

/// An ordered group of variables created together under one base name
#[derive(Debug, Clone, PartialEq)]
pub struct VariableFamily {
    name: String,
    shape: Vec<usize>,
    kind: VariableKind,
    members: Vec<VarRef>,
}

impl VariableFamily {
    pub(crate) fn new(name: String, shape: Vec<usize>, kind: VariableKind, members: Vec<VarRef>) -> Self {
        VariableFamily {
            name,
            shape,
            kind,
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Number of variables in the family
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Get the variable at a flattened (row-major) position
    pub fn get(&self, index: usize) -> Option<VarRef> {
        self.members.get(index).copied()
    }

    /// Get the variable at a multi-dimensional position
    pub fn at(&self, position: &[usize]) -> Option<VarRef> {
        flat_index(&self.shape, position).and_then(|i| self.get(i))
    }

    /// Iterate over the members in creation order
    pub fn iter(&self) -> impl Iterator<Item = VarRef> + '_ {
        self.members.iter().copied()
    }

    /// Members in creation order
    pub fn members(&self) -> &[VarRef] {
        &self.members
    }
}

impl Index<usize> for VariableFamily {
    type Output = VarRef;

    fn index(&self, index: usize) -> &Self::Output {
        &self.members[index]
    }
}

impl<'a> IntoIterator for &'a VariableFamily {
    type Item = VarRef;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, VarRef>>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter().copied()
    }
}

/// Convert a multi-dimensional position into a row-major flat index
pub(crate) fn flat_index(shape: &[usize], position: &[usize]) -> Option<usize> {
    if shape.len() != position.len() {
        return None;
    }
    let mut flat = 0;
    for (&dim, &pos) in shape.iter().zip(position) {
        if pos >= dim {
            return None;
        }
        flat = flat * dim + pos;
    }
    Some(flat)
}

/// Name of the member of family `base` at a flattened index, e.g. `x[1,2]`
pub(crate) fn member_name(base: &str, shape: &[usize], flat: usize) -> String {
    let mut position = vec![0; shape.len()];
    let mut rest = flat;
    for (slot, &dim) in position.iter_mut().zip(shape).rev() {
        *slot = rest % dim;
        rest /= dim;
    }
    let joined = position
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}[{}]", base, joined)
}
