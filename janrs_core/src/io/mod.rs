//! Module for reading trained predictive models
pub mod json;

pub use json::{load_trained_model, parse_trained_model, TrainedModel};
