//! Model Lifecycle Gateway: the single owner of the native model slot.
//!
//! The engine lives on one dedicated worker thread and every operation is
//! queued to it, so the native handle is never touched from two threads and
//! operations run strictly in submission order. Training input is validated on
//! the caller's thread before anything is queued. Operations that need a model
//! check the state first, on the worker, and only then look at their input.
//! Rejected input never reaches the engine.
//!
//! ```no_run
//! use xgbridge::gateway::Gateway;
//! use xgbridge::engine::XgboostEngine;
//! use xgbridge::validation::{FeatureMatrix, LabelVector, ParameterMap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = XgboostEngine::discover(&Default::default())?;
//! let gateway = Gateway::new(engine)?;
//! let features = FeatureMatrix::from_rows(&[[1.0f32, 2.0], [3.0, 4.0]])?;
//! let labels = LabelVector::from_slice(&[0.0f32, 1.0])?;
//! gateway
//!     .train(features.clone(), labels, ParameterMap::new().with("max_depth", 3))
//!     .wait()?;
//! let scores = gateway.predict(features).wait()?;
//! assert_eq!(scores.len(), 2);
//! # Ok(())
//! # }
//! ```

mod error;
mod pending;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use serde_json::Value;

use crate::engine::NativeEngine;
use crate::validation::{
    CanonicalParams, FeatureMatrix, ImportanceType, LabelVector, ParameterMap,
    canonicalize_parameters,
};

pub use error::GatewayError;
pub use pending::PendingOp;

const WORKER_THREAD_NAME: &str = "xgbridge-engine";

/// Whether the model slot currently holds a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loaded => "loaded",
        })
    }
}

type Job<E> = Box<dyn FnOnce(&mut Worker<E>) + Send>;

/// Serialized, validated access to one native model slot.
pub struct Gateway<E: NativeEngine> {
    jobs: Option<Sender<Job<E>>>,
    worker: Option<JoinHandle<()>>,
    loaded: Arc<AtomicBool>,
}

impl<E: NativeEngine> Gateway<E> {
    /// Move `engine` onto a dedicated worker thread.
    pub fn new(engine: E) -> Result<Self, GatewayError> {
        let (tx, rx) = mpsc::channel::<Job<E>>();
        let loaded = Arc::new(AtomicBool::new(false));
        let mut worker = Worker {
            engine,
            loaded: Arc::clone(&loaded),
        };
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                for job in rx {
                    job(&mut worker);
                }
                worker.release();
            })
            .map_err(GatewayError::Spawn)?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(handle),
            loaded,
        })
    }

    /// State after the most recently completed operation.
    pub fn state(&self) -> ModelState {
        if self.loaded.load(Ordering::SeqCst) {
            ModelState::Loaded
        } else {
            ModelState::Unloaded
        }
    }

    /// Replace the current model with the one stored at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> PendingOp<()> {
        let path = path.as_ref();
        let resolved = match resolve_model_file(path) {
            Ok(resolved) => resolved,
            Err(reason) => {
                return PendingOp::ready(Err(GatewayError::Load {
                    path: path.to_path_buf(),
                    reason,
                }));
            }
        };
        self.submit("load", move |worker| {
            if worker.engine.load_model(&resolved) {
                worker.set_loaded(true);
                tracing::info!("Loaded model from {}", resolved.display());
                return Ok(());
            }
            worker.set_loaded(false);
            let reason = worker.native_reason("native load reported failure");
            tracing::warn!("Model load from {} failed: {reason}", resolved.display());
            Err(GatewayError::Load {
                path: resolved,
                reason,
            })
        })
    }

    /// Fit a new model, replacing whatever the slot held.
    pub fn train(
        &self,
        features: FeatureMatrix,
        labels: LabelVector,
        params: impl Into<ParameterMap>,
    ) -> PendingOp<()> {
        if let Err(err) = features.check_labels(&labels) {
            return PendingOp::ready(Err(err.into()));
        }
        let params = canonicalize_parameters(&params.into());
        self.submit_train(features, labels, params)
    }

    /// Validate loosely typed input (decoded JSON) and train on it.
    pub fn train_json(&self, features: &Value, labels: &Value, params: &Value) -> PendingOp<()> {
        let validated = FeatureMatrix::from_json(features).and_then(|features| {
            let labels = LabelVector::from_json(labels)?;
            let params = ParameterMap::from_json(params)?;
            Ok((features, labels, params))
        });
        match validated {
            Ok((features, labels, params)) => self.train(features, labels, params),
            Err(err) => PendingOp::ready(Err(err.into())),
        }
    }

    /// Score every row of `features` with the current model.
    pub fn predict(&self, features: FeatureMatrix) -> PendingOp<Vec<f32>> {
        self.submit("predict", move |worker| {
            worker.require_loaded()?;
            worker.score(&features)
        })
    }

    /// Validate loosely typed input (decoded JSON) and score it.
    ///
    /// The model state is checked before the input, so an unloaded gateway
    /// reports `NotLoaded` whatever the input looks like.
    pub fn predict_json(&self, features: &Value) -> PendingOp<Vec<f32>> {
        let features = features.clone();
        self.submit("predict", move |worker| {
            worker.require_loaded()?;
            let features = FeatureMatrix::from_json(&features)?;
            worker.score(&features)
        })
    }

    /// Serialize the current model to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> PendingOp<()> {
        let path = path.as_ref().to_path_buf();
        self.submit("save", move |worker| {
            worker.require_loaded()?;
            if path.as_os_str().is_empty() {
                return Err(GatewayError::Save {
                    path,
                    reason: "path is empty".into(),
                });
            }
            if worker.engine.save_model(&path) {
                tracing::info!("Saved model to {}", path.display());
                return Ok(());
            }
            let reason = worker.native_reason("native save reported failure");
            tracing::warn!("Model save to {} failed: {reason}", path.display());
            Err(GatewayError::Save { path, reason })
        })
    }

    /// One importance score per feature column of the current model.
    pub fn feature_importance(&self, kind: ImportanceType) -> PendingOp<Vec<f32>> {
        self.submit("feature_importance", move |worker| {
            worker.require_loaded()?;
            worker.engine.feature_importance(kind).ok_or_else(|| {
                GatewayError::Importance(worker.native_reason("native engine returned no scores"))
            })
        })
    }

    /// Release the current model. Never fails and is a no-op when unloaded.
    ///
    /// Returns after every previously submitted operation has finished.
    pub fn unload(&self) {
        let op = self.submit("unload", |worker| {
            worker.release();
            Ok(())
        });
        if let Err(err) = op.wait() {
            tracing::warn!("Unload did not complete cleanly: {err}");
            self.loaded.store(false, Ordering::SeqCst);
        }
    }

    fn submit_train(
        &self,
        features: FeatureMatrix,
        labels: LabelVector,
        params: CanonicalParams,
    ) -> PendingOp<()> {
        tracing::debug!(
            "Queueing training on {}x{} features with {} parameters",
            features.rows(),
            features.columns(),
            params.len()
        );
        self.submit("train", move |worker| {
            if worker.engine.train(&features, &labels, &params) {
                worker.set_loaded(true);
                tracing::info!("Trained model on {} rows", features.rows());
                return Ok(());
            }
            worker.set_loaded(false);
            let reason = worker.native_reason("native training reported failure");
            tracing::warn!("Training failed: {reason}");
            Err(GatewayError::Train(reason))
        })
    }

    fn submit<T, F>(&self, op: &'static str, run: F) -> PendingOp<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Worker<E>) -> Result<T, GatewayError> + Send + 'static,
    {
        let (completion, pending) = pending::pending();
        let job: Job<E> = Box::new(move |worker| {
            let result = worker.guarded(op, run);
            completion.complete(result);
        });
        let sent = self.jobs.as_ref().map(|jobs| jobs.send(job));
        if !matches!(sent, Some(Ok(()))) {
            // The dropped job resolves `pending` with `WorkerGone`.
            tracing::error!("Engine worker is gone; {op} was not run");
        }
        pending
    }
}

impl<E: NativeEngine> Drop for Gateway<E> {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Engine worker panicked during shutdown");
            }
        }
    }
}

struct Worker<E> {
    engine: E,
    loaded: Arc<AtomicBool>,
}

impl<E: NativeEngine> Worker<E> {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    fn require_loaded(&self) -> Result<(), GatewayError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(GatewayError::NotLoaded)
        }
    }

    fn score(&mut self, features: &FeatureMatrix) -> Result<Vec<f32>, GatewayError> {
        let rows = features.rows();
        let Some(scores) = self.engine.predict(features) else {
            let reason = self.native_reason("native engine returned no result");
            tracing::warn!("Prediction failed: {reason}");
            return Err(GatewayError::Prediction(reason));
        };
        if scores.len() != rows {
            tracing::warn!("Prediction returned {} values for {rows} rows", scores.len());
            return Err(GatewayError::Prediction(format!(
                "expected {rows} predictions, got {}",
                scores.len()
            )));
        }
        tracing::debug!("Predicted {rows} rows");
        Ok(scores)
    }

    fn native_reason(&self, fallback: &str) -> String {
        self.engine
            .last_error()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn release(&mut self) {
        if !self.is_loaded() {
            return;
        }
        match self.unload_native() {
            Ok(true) => tracing::info!("Unloaded model"),
            Ok(false) => tracing::warn!(
                "Native unload reported failure: {}",
                self.native_reason("no detail")
            ),
            Err(message) => tracing::error!("Native unload panicked: {message}"),
        }
        self.set_loaded(false);
    }

    fn unload_native(&mut self) -> Result<bool, String> {
        catch_unwind(AssertUnwindSafe(|| self.engine.unload_model())).map_err(panic_to_string)
    }

    fn guarded<T>(
        &mut self,
        op: &'static str,
        run: impl FnOnce(&mut Self) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        match catch_unwind(AssertUnwindSafe(|| run(self))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_to_string(payload);
                tracing::error!("Native engine panicked during {op}: {message}");
                // Drop whatever handle the panic left behind.
                if let Err(again) = self.unload_native() {
                    tracing::error!("Native unload after fault panicked: {again}");
                }
                self.set_loaded(false);
                Err(GatewayError::EngineFault { op, message })
            }
        }
    }
}

fn resolve_model_file(path: &Path) -> Result<PathBuf, String> {
    if path.as_os_str().is_empty() {
        return Err("path is empty".into());
    }
    let resolved =
        std::path::absolute(path).map_err(|err| format!("cannot resolve path: {err}"))?;
    if !resolved.is_file() {
        return Err(format!("model file {} does not exist", resolved.display()));
    }
    Ok(resolved)
}

fn panic_to_string(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
