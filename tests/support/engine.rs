use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use xgbridge::engine::NativeEngine;
use xgbridge::validation::{CanonicalParams, FeatureMatrix, ImportanceType, LabelVector};

/// Native calls observed by [`RecordingEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Load(PathBuf),
    Train {
        rows: usize,
        columns: usize,
        labels: usize,
        params: BTreeMap<String, String>,
    },
    Predict { rows: usize },
    Save(PathBuf),
    Unload,
    Importance(ImportanceType),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PredictMode {
    /// One score per row: the row mean.
    #[default]
    RowMeans,
    /// Report failure with no result.
    Missing,
    /// Return one score too many.
    WrongLength,
    /// Panic inside the call.
    Panics,
}

/// Shared view of the calls an engine received after it moved into a gateway.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

/// In-memory [`NativeEngine`] that persists models as small text files.
#[derive(Default)]
pub struct RecordingEngine {
    log: CallLog,
    model_columns: Option<usize>,
    predict_mode: PredictMode,
    fail_train: bool,
    panic_on_train: bool,
    last_error: Option<String>,
}

impl RecordingEngine {
    pub fn new() -> (Self, CallLog) {
        let engine = Self::default();
        let log = engine.log.clone();
        (engine, log)
    }

    pub fn predicting(mut self, mode: PredictMode) -> Self {
        self.predict_mode = mode;
        self
    }

    pub fn failing_train(mut self) -> Self {
        self.fail_train = true;
        self
    }

    pub fn panicking_train(mut self) -> Self {
        self.panic_on_train = true;
        self
    }
}

impl NativeEngine for RecordingEngine {
    fn load_model(&mut self, path: &Path) -> bool {
        self.log.push(Call::Load(path.to_path_buf()));
        self.model_columns = None;
        let parsed = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| text.strip_prefix("model:")?.trim().parse::<usize>().ok());
        match parsed {
            Some(columns) => {
                self.model_columns = Some(columns);
                true
            }
            None => {
                self.last_error = Some(format!("{} is not a model file", path.display()));
                false
            }
        }
    }

    fn train(
        &mut self,
        features: &FeatureMatrix,
        labels: &LabelVector,
        params: &CanonicalParams,
    ) -> bool {
        self.log.push(Call::Train {
            rows: features.rows(),
            columns: features.columns(),
            labels: labels.len(),
            params: params.clone().into_inner(),
        });
        self.model_columns = None;
        if self.panic_on_train {
            panic!("native training aborted");
        }
        if self.fail_train {
            self.last_error = Some("objective not supported".to_string());
            return false;
        }
        self.model_columns = Some(features.columns());
        true
    }

    fn predict(&mut self, features: &FeatureMatrix) -> Option<Vec<f32>> {
        self.log.push(Call::Predict {
            rows: features.rows(),
        });
        let means = (0..features.rows()).map(|index| {
            let row = features.row(index).unwrap_or(&[]);
            row.iter().sum::<f32>() / row.len().max(1) as f32
        });
        match self.predict_mode {
            PredictMode::RowMeans => Some(means.collect()),
            PredictMode::Missing => None,
            PredictMode::WrongLength => Some(means.chain([0.0]).collect()),
            PredictMode::Panics => panic!("native predict aborted"),
        }
    }

    fn save_model(&mut self, path: &Path) -> bool {
        self.log.push(Call::Save(path.to_path_buf()));
        let Some(columns) = self.model_columns else {
            return false;
        };
        match std::fs::write(path, format!("model:{columns}")) {
            Ok(()) => true,
            Err(err) => {
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    fn unload_model(&mut self) -> bool {
        self.log.push(Call::Unload);
        self.model_columns = None;
        true
    }

    fn feature_importance(&mut self, kind: ImportanceType) -> Option<Vec<f32>> {
        self.log.push(Call::Importance(kind));
        self.model_columns.map(|columns| vec![1.0 / columns as f32; columns])
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
