//! Core rust implementation of Jan.rs, a crate for optimizing over decision variables whose
//! relationship to the objective is given by a pretrained predictive model.

pub mod configuration;
pub mod io;
pub mod optimize;
pub mod predictive;

pub use configuration::ModelConfig;
pub use optimize::constraint::Relation;
pub use optimize::expression::Expression;
pub use optimize::model::{ModelError, ModelState, OptimizationModel};
pub use optimize::objective::ObjectiveSense;
pub use optimize::variable::{Domain, VarRef, VariableFamily, VariableKind};
pub use optimize::SolveStatus;
pub use predictive::binding::{FeatureSource, OptimizationPredictiveModel};
pub use predictive::piecewise::PiecewiseFormulation;
