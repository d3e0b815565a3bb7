//! Input validation for everything that crosses into the native engine.
//!
//! These functions are pure: no I/O, no native calls. They turn caller input
//! into the homogeneous shapes the engine expects (row-major `f32` buffers and
//! string parameter maps) or report why the input was rejected.

mod matrix;
mod params;

pub use matrix::{FeatureMatrix, LabelVector, validate_feature_matrix, validate_label_vector};
pub use params::{
    CanonicalParams, ImportanceType, Objective, ParamValue, ParameterMap, TrainParams,
    canonicalize_parameters,
};

use thiserror::Error;

/// Reasons caller input was rejected before reaching the native engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Input is not shaped like the expected sequence (or nested sequence).
    #[error("Invalid shape: {0}")]
    Shape(String),
    /// A value is not a finite number.
    #[error("Non-numeric value at row {row}, column {column}")]
    Numeric { row: usize, column: usize },
    /// Label count does not match the feature row count.
    #[error("Expected {rows} labels to match the feature rows, got {labels}")]
    LabelCount { rows: usize, labels: usize },
    /// A parameter value is not a flat scalar.
    #[error("Invalid parameter '{key}': {reason}")]
    Parameter { key: String, reason: String },
}
