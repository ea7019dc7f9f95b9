//! Typed solver configuration forwarded to the solver adapter at solve time
use std::fmt::{Display, Formatter};

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options handed to a [`SolverAdapter`](crate::optimize::solvers::SolverAdapter)
///
/// The commonly used options are typed fields, anything else is kept verbatim in `extra` and
/// interpreted (or ignored) by the adapter.
///
/// # Examples
/// ```rust
/// use janrs_core::optimize::params::SolverParamsBuilder;
/// let params = SolverParamsBuilder::default()
///     .time_limit(1800.)
///     .mip_gap(0.001)
///     .threads(1u32)
///     .build()
///     .unwrap();
/// assert_eq!(params.threads, Some(1));
/// assert!(!params.output_flag);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Builder, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct SolverParams {
    /// Wall clock limit for the solver, in seconds
    #[builder(setter(into, strip_option))]
    pub time_limit: Option<f64>,
    /// Relative optimality gap at which a MIP solve may stop
    #[builder(setter(into, strip_option))]
    pub mip_gap: Option<f64>,
    /// Number of threads the solver may use
    #[builder(setter(into, strip_option))]
    pub threads: Option<u32>,
    /// Whether the solver may write its log to the console
    pub output_flag: bool,
    /// Adapter specific options, passed through untouched
    pub extra: IndexMap<String, ParamValue>,
}

impl SolverParams {
    /// Set an option by name
    ///
    /// `TimeLimit`, `MIPGap`, `Threads` and `OutputFlag` (matched case insensitively, with or
    /// without underscores) populate the typed fields. Every other name is stored in `extra`.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), ParamsError> {
        let value = value.into();
        let key = name.to_ascii_lowercase().replace('_', "");
        match key.as_str() {
            "timelimit" => {
                let seconds = value.as_f64().ok_or_else(|| invalid(name, &value))?;
                if seconds < 0. {
                    return Err(invalid(name, &value));
                }
                self.time_limit = Some(seconds);
            }
            "mipgap" | "miprelgap" => {
                let gap = value.as_f64().ok_or_else(|| invalid(name, &value))?;
                if gap < 0. {
                    return Err(invalid(name, &value));
                }
                self.mip_gap = Some(gap);
            }
            "threads" => {
                let threads = value
                    .as_i64()
                    .and_then(|t| u32::try_from(t).ok())
                    .ok_or_else(|| invalid(name, &value))?;
                self.threads = Some(threads);
            }
            "outputflag" => {
                self.output_flag = value.as_bool().ok_or_else(|| invalid(name, &value))?;
            }
            _ => {
                self.extra.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ParamsError> {
        serde_json::from_str(json).map_err(|e| ParamsError::Parse(e.to_string()))
    }

    /// Serialize the options as JSON
    pub fn to_json(&self) -> Result<String, ParamsError> {
        serde_json::to_string(self).map_err(|e| ParamsError::Parse(e.to_string()))
    }
}

fn invalid(name: &str, value: &ParamValue) -> ParamsError {
    ParamsError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Value of a solver option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0. => Some(*f as i64),
            _ => None,
        }
    }

    /// Booleans, and the integers 0 and 1
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Int(0) => Some(false),
            ParamValue::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Errors associated with solver options
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    /// A recognized option was given a value of the wrong type or range
    #[error("Invalid value '{value}' for solver option '{name}'")]
    InvalidValue { name: String, value: String },
    /// Options could not be (de)serialized
    #[error("Could not parse solver options: {0}")]
    Parse(String),
}
