use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ValidationError;

/// Failures surfaced by [`super::Gateway`] operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caller input was rejected before reaching the engine.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The operation needs a loaded model and none is loaded.
    #[error("No model is loaded")]
    NotLoaded,
    #[error("Failed to load model from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("Training failed: {0}")]
    Train(String),
    /// The engine failed or returned a result that does not match the input.
    #[error("Prediction failed: {0}")]
    Prediction(String),
    #[error("Failed to save model to {path}: {reason}")]
    Save { path: PathBuf, reason: String },
    #[error("Feature importance failed: {0}")]
    Importance(String),
    /// The engine panicked instead of reporting failure. The model slot is
    /// treated as unloaded afterwards.
    #[error("Native engine faulted during {op}: {message}")]
    EngineFault { op: &'static str, message: String },
    #[error("Engine worker is no longer running")]
    WorkerGone,
    #[error("Failed to start engine worker: {0}")]
    Spawn(#[source] std::io::Error),
}
