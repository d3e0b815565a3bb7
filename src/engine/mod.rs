//! Boundary to the native gradient-boosting engine.
//!
//! [`NativeEngine`] mirrors the engine's own contract: operations report
//! failure through `false`/`None` rather than typed errors. The gateway is
//! the layer that turns those into [`crate::gateway::GatewayError`] values.

mod locate;
mod xgboost;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::validation::{CanonicalParams, FeatureMatrix, ImportanceType, LabelVector};

pub use locate::{LIBRARY_ENV, candidate_paths, locate_library};
pub use xgboost::XgboostEngine;

/// Boosting rounds used when the parameters do not name `num_round`.
pub const DEFAULT_NUM_ROUND: u32 = 10;
/// Parameter key consumed by the engine wrapper instead of the native setter.
pub const NUM_ROUND_KEY: &str = "num_round";

/// One native model slot.
///
/// Implementations are driven from a single thread and never concurrently.
pub trait NativeEngine: Send + 'static {
    /// Replace the current model with the one stored at `path`.
    fn load_model(&mut self, path: &Path) -> bool;
    /// Fit a new model in place of the current one.
    fn train(
        &mut self,
        features: &FeatureMatrix,
        labels: &LabelVector,
        params: &CanonicalParams,
    ) -> bool;
    /// Score every row. `None` signals a native failure.
    fn predict(&mut self, features: &FeatureMatrix) -> Option<Vec<f32>>;
    fn save_model(&mut self, path: &Path) -> bool;
    /// Release the current model, if any.
    fn unload_model(&mut self) -> bool;
    /// One score per feature column for the current model.
    fn feature_importance(&mut self, kind: ImportanceType) -> Option<Vec<f32>>;
    /// Most recent native error message, when the engine keeps one.
    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Failures opening the native engine library.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Native engine library not found (searched: {})", format_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("Failed to load native engine library at {path}: {reason}")]
    Library { path: PathBuf, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split `num_round` out of the native parameter set.
///
/// Returns the round count and the remaining parameters. An unparseable or
/// zero round count is reported as an error message.
pub fn split_num_round(params: &CanonicalParams) -> Result<(u32, Vec<(&str, &str)>), String> {
    let rounds = match params.get(NUM_ROUND_KEY) {
        None => DEFAULT_NUM_ROUND,
        Some(raw) => match raw.parse::<u32>() {
            Ok(0) | Err(_) => {
                return Err(format!("num_round must be a positive integer, got '{raw}'"));
            }
            Ok(rounds) => rounds,
        },
    };
    let rest = params
        .iter()
        .filter(|(key, _)| *key != NUM_ROUND_KEY)
        .collect();
    Ok((rounds, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ParameterMap, canonicalize_parameters};

    #[test]
    fn num_round_defaults_and_is_removed() {
        let params = canonicalize_parameters(&ParameterMap::new().with("eta", 0.3));
        let (rounds, rest) = split_num_round(&params).unwrap();
        assert_eq!(rounds, DEFAULT_NUM_ROUND);
        assert_eq!(rest, vec![("eta", "0.3")]);

        let params = canonicalize_parameters(
            &ParameterMap::new().with("num_round", 25).with("max_depth", 3),
        );
        let (rounds, rest) = split_num_round(&params).unwrap();
        assert_eq!(rounds, 25);
        assert_eq!(rest, vec![("max_depth", "3")]);
    }

    #[test]
    fn num_round_rejects_garbage() {
        for raw in ["0", "-3", "ten", "2.5"] {
            let params = canonicalize_parameters(&ParameterMap::new().with("num_round", raw));
            assert!(split_num_round(&params).is_err(), "{raw}");
        }
    }
}
