use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr;

use libloading::{Library, Symbol};

use crate::config::EngineSettings;
use crate::validation::{CanonicalParams, FeatureMatrix, ImportanceType, LabelVector};

use super::{EngineError, NativeEngine, locate_library, split_num_round};

type BoosterHandle = *mut c_void;
type DMatrixHandle = *mut c_void;
type BstUlong = u64;

const XGB_OK: c_int = 0;

/// [`NativeEngine`] backed by a dynamically loaded `xgboost` shared library.
pub struct XgboostEngine {
    api: XgbApi,
    booster: Option<Booster>,
    last_error: Option<String>,
    // Declared last so every handle is released before the library unloads.
    _lib: Library,
}

impl XgboostEngine {
    /// Open the library at `path`.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let (lib, api) = XgbApi::load(path)?;
        tracing::info!("Loaded native engine from {}", path.display());
        Ok(Self {
            api,
            booster: None,
            last_error: None,
            _lib: lib,
        })
    }

    /// Locate the library using `settings` and the standard search order, then open it.
    pub fn discover(settings: &EngineSettings) -> Result<Self, EngineError> {
        let path = locate_library(settings)?;
        Self::open(&path)
    }

    fn record<T>(&mut self, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(message) => {
                tracing::warn!("Native engine call failed: {message}");
                self.last_error = Some(message);
                None
            }
        }
    }

    fn loaded(&self) -> Result<&Booster, String> {
        self.booster
            .as_ref()
            .ok_or_else(|| "No native model is loaded".to_string())
    }

    fn try_load(&self, path: &Path) -> Result<Booster, String> {
        let path_c = c_path(path)?;
        let booster = self.api.booster(&[])?;
        self.api.status(
            unsafe { (self.api.booster_load_model)(booster.handle, path_c.as_ptr()) },
            "XGBoosterLoadModel",
        )?;
        Ok(booster)
    }

    fn try_train(
        &self,
        features: &FeatureMatrix,
        labels: &LabelVector,
        params: &CanonicalParams,
    ) -> Result<Booster, String> {
        let (rounds, native_params) = split_num_round(params)?;
        let dtrain = self.api.matrix(features)?;
        self.api.status(
            unsafe {
                (self.api.dmatrix_set_float_info)(
                    dtrain.handle,
                    c"label".as_ptr(),
                    labels.as_slice().as_ptr(),
                    labels.len() as BstUlong,
                )
            },
            "XGDMatrixSetFloatInfo",
        )?;
        let booster = self.api.booster(&[dtrain.handle])?;
        for (key, value) in native_params {
            let (Ok(key_c), Ok(value_c)) = (CString::new(key), CString::new(value)) else {
                return Err(format!("Parameter '{key}' contains null bytes"));
            };
            self.api.status(
                unsafe {
                    (self.api.booster_set_param)(booster.handle, key_c.as_ptr(), value_c.as_ptr())
                },
                "XGBoosterSetParam",
            )?;
        }
        for iteration in 0..rounds {
            let iteration = c_int::try_from(iteration).unwrap_or(c_int::MAX);
            self.api.status(
                unsafe { (self.api.booster_update_one_iter)(booster.handle, iteration, dtrain.handle) },
                "XGBoosterUpdateOneIter",
            )?;
        }
        tracing::debug!(
            "Trained {rounds} rounds on a {}x{} matrix",
            features.rows(),
            features.columns()
        );
        Ok(booster)
    }

    fn try_predict(&self, features: &FeatureMatrix) -> Result<Vec<f32>, String> {
        let booster = self.loaded()?;
        let dmatrix = self.api.matrix(features)?;
        let mut out_len: BstUlong = 0;
        let mut out_result: *const f32 = ptr::null();
        self.api.status(
            unsafe {
                (self.api.booster_predict)(
                    booster.handle,
                    dmatrix.handle,
                    0,
                    0,
                    0,
                    &mut out_len,
                    &mut out_result,
                )
            },
            "XGBoosterPredict",
        )?;
        if out_result.is_null() {
            return Err("XGBoosterPredict returned no buffer".to_string());
        }
        let len = usize::try_from(out_len).map_err(|err| err.to_string())?;
        // The buffer belongs to the booster and stays valid until its next call.
        Ok(unsafe { std::slice::from_raw_parts(out_result, len) }.to_vec())
    }

    fn try_save(&self, path: &Path) -> Result<(), String> {
        let booster = self.loaded()?;
        let path_c = c_path(path)?;
        self.api.status(
            unsafe { (self.api.booster_save_model)(booster.handle, path_c.as_ptr()) },
            "XGBoosterSaveModel",
        )
    }

    fn try_importance(&self, kind: ImportanceType) -> Result<Vec<f32>, String> {
        let booster = self.loaded()?;
        let mut columns: BstUlong = 0;
        self.api.status(
            unsafe { (self.api.booster_get_num_feature)(booster.handle, &mut columns) },
            "XGBoosterGetNumFeature",
        )?;
        let columns = usize::try_from(columns).map_err(|err| err.to_string())?;
        let config = serde_json::json!({
            "importance_type": kind.as_str(),
            "feature_map": "",
        })
        .to_string();
        let config_c = CString::new(config).map_err(|err| err.to_string())?;
        let mut n_features: BstUlong = 0;
        let mut names: *const *const c_char = ptr::null();
        let mut dim: BstUlong = 0;
        let mut shape: *const BstUlong = ptr::null();
        let mut scores: *const f32 = ptr::null();
        self.api.status(
            unsafe {
                (self.api.booster_feature_score)(
                    booster.handle,
                    config_c.as_ptr(),
                    &mut n_features,
                    &mut names,
                    &mut dim,
                    &mut shape,
                    &mut scores,
                )
            },
            "XGBoosterFeatureScore",
        )?;
        let count = usize::try_from(n_features).map_err(|err| err.to_string())?;
        if count == 0 {
            return Ok(vec![0.0; columns]);
        }
        if dim != 1 {
            return Err(format!("Unsupported importance shape with {dim} dimensions"));
        }
        if names.is_null() || scores.is_null() {
            return Err("XGBoosterFeatureScore returned no data".to_string());
        }
        let names = unsafe { std::slice::from_raw_parts(names, count) };
        let scores = unsafe { std::slice::from_raw_parts(scores, count) };
        let by_name: HashMap<String, f32> = names
            .iter()
            .zip(scores)
            .map(|(&name, &score)| {
                let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
                (name, score)
            })
            .collect();
        Ok(spread_scores(&by_name, columns))
    }
}

impl NativeEngine for XgboostEngine {
    fn load_model(&mut self, path: &Path) -> bool {
        self.booster = None;
        let result = self.try_load(path);
        self.record(result).map(|booster| self.booster = Some(booster)).is_some()
    }

    fn train(
        &mut self,
        features: &FeatureMatrix,
        labels: &LabelVector,
        params: &CanonicalParams,
    ) -> bool {
        self.booster = None;
        let result = self.try_train(features, labels, params);
        self.record(result).map(|booster| self.booster = Some(booster)).is_some()
    }

    fn predict(&mut self, features: &FeatureMatrix) -> Option<Vec<f32>> {
        let result = self.try_predict(features);
        self.record(result)
    }

    fn save_model(&mut self, path: &Path) -> bool {
        let result = self.try_save(path);
        self.record(result).is_some()
    }

    fn unload_model(&mut self) -> bool {
        match self.booster.take() {
            Some(booster) => {
                let result = booster.free();
                self.record(result).is_some()
            }
            None => true,
        }
    }

    fn feature_importance(&mut self, kind: ImportanceType) -> Option<Vec<f32>> {
        let result = self.try_importance(kind);
        self.record(result)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

fn c_path(path: &Path) -> Result<CString, String> {
    CString::new(path.to_string_lossy().as_bytes())
        .map_err(|_| format!("Model path {} contains null bytes", path.display()))
}

/// Features that never appear in a split are absent from the native result.
fn spread_scores(by_name: &HashMap<String, f32>, columns: usize) -> Vec<f32> {
    (0..columns)
        .map(|index| by_name.get(&format!("f{index}")).copied().unwrap_or(0.0))
        .collect()
}

struct Booster {
    api: XgbApi,
    handle: BoosterHandle,
}

// Only reached through the owning engine, which the gateway drives from one thread.
unsafe impl Send for Booster {}

impl Booster {
    fn free(self) -> Result<(), String> {
        let status = unsafe { (self.api.booster_free)(self.handle) };
        let api = self.api;
        std::mem::forget(self);
        api.status(status, "XGBoosterFree")
    }
}

impl Drop for Booster {
    fn drop(&mut self) {
        unsafe { (self.api.booster_free)(self.handle) };
    }
}

struct DMatrix {
    api: XgbApi,
    handle: DMatrixHandle,
}

impl Drop for DMatrix {
    fn drop(&mut self) {
        unsafe { (self.api.dmatrix_free)(self.handle) };
    }
}

#[derive(Clone, Copy)]
struct XgbApi {
    get_last_error: unsafe extern "C" fn() -> *const c_char,
    dmatrix_create_from_mat: unsafe extern "C" fn(
        *const f32,
        BstUlong,
        BstUlong,
        f32,
        *mut DMatrixHandle,
    ) -> c_int,
    dmatrix_set_float_info:
        unsafe extern "C" fn(DMatrixHandle, *const c_char, *const f32, BstUlong) -> c_int,
    dmatrix_free: unsafe extern "C" fn(DMatrixHandle) -> c_int,
    booster_create: unsafe extern "C" fn(*const DMatrixHandle, BstUlong, *mut BoosterHandle) -> c_int,
    booster_free: unsafe extern "C" fn(BoosterHandle) -> c_int,
    booster_set_param: unsafe extern "C" fn(BoosterHandle, *const c_char, *const c_char) -> c_int,
    booster_update_one_iter: unsafe extern "C" fn(BoosterHandle, c_int, DMatrixHandle) -> c_int,
    booster_predict: unsafe extern "C" fn(
        BoosterHandle,
        DMatrixHandle,
        c_int,
        c_uint,
        c_int,
        *mut BstUlong,
        *mut *const f32,
    ) -> c_int,
    booster_load_model: unsafe extern "C" fn(BoosterHandle, *const c_char) -> c_int,
    booster_save_model: unsafe extern "C" fn(BoosterHandle, *const c_char) -> c_int,
    booster_get_num_feature: unsafe extern "C" fn(BoosterHandle, *mut BstUlong) -> c_int,
    booster_feature_score: unsafe extern "C" fn(
        BoosterHandle,
        *const c_char,
        *mut BstUlong,
        *mut *const *const c_char,
        *mut BstUlong,
        *mut *const BstUlong,
        *mut *const f32,
    ) -> c_int,
}

impl XgbApi {
    fn load(path: &Path) -> Result<(Library, Self), EngineError> {
        let library_error = |err: libloading::Error| EngineError::Library {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };
        let lib = unsafe { Library::new(path) }.map_err(library_error)?;
        let bind = || -> Result<XgbApi, libloading::Error> {
            Ok(unsafe {
                XgbApi {
                    get_last_error: symbol(&lib, b"XGBGetLastError\0")?,
                    dmatrix_create_from_mat: symbol(&lib, b"XGDMatrixCreateFromMat\0")?,
                    dmatrix_set_float_info: symbol(&lib, b"XGDMatrixSetFloatInfo\0")?,
                    dmatrix_free: symbol(&lib, b"XGDMatrixFree\0")?,
                    booster_create: symbol(&lib, b"XGBoosterCreate\0")?,
                    booster_free: symbol(&lib, b"XGBoosterFree\0")?,
                    booster_set_param: symbol(&lib, b"XGBoosterSetParam\0")?,
                    booster_update_one_iter: symbol(&lib, b"XGBoosterUpdateOneIter\0")?,
                    booster_predict: symbol(&lib, b"XGBoosterPredict\0")?,
                    booster_load_model: symbol(&lib, b"XGBoosterLoadModel\0")?,
                    booster_save_model: symbol(&lib, b"XGBoosterSaveModel\0")?,
                    booster_get_num_feature: symbol(&lib, b"XGBoosterGetNumFeature\0")?,
                    booster_feature_score: symbol(&lib, b"XGBoosterFeatureScore\0")?,
                }
            })
        };
        let api = bind().map_err(library_error)?;
        Ok((lib, api))
    }

    fn status(&self, code: c_int, context: &str) -> Result<(), String> {
        if code == XGB_OK {
            return Ok(());
        }
        let raw = unsafe { (self.get_last_error)() };
        let message = if raw.is_null() {
            "unknown native error".to_string()
        } else {
            unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
        };
        Err(format!("{context}: {message}"))
    }

    fn matrix(&self, features: &FeatureMatrix) -> Result<DMatrix, String> {
        let mut handle: DMatrixHandle = ptr::null_mut();
        // NaN marks missing cells; validated input never contains one.
        self.status(
            unsafe {
                (self.dmatrix_create_from_mat)(
                    features.as_slice().as_ptr(),
                    features.rows() as BstUlong,
                    features.columns() as BstUlong,
                    f32::NAN,
                    &mut handle,
                )
            },
            "XGDMatrixCreateFromMat",
        )?;
        Ok(DMatrix { api: *self, handle })
    }

    fn booster(&self, cache: &[DMatrixHandle]) -> Result<Booster, String> {
        let mut handle: BoosterHandle = ptr::null_mut();
        self.status(
            unsafe {
                (self.booster_create)(cache.as_ptr(), cache.len() as BstUlong, &mut handle)
            },
            "XGBoosterCreate",
        )?;
        Ok(Booster { api: *self, handle })
    }
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    let symbol: Symbol<'_, T> = unsafe { lib.get(name)? };
    Ok(*symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_spread_over_every_column() {
        let by_name = HashMap::from([("f0".to_string(), 2.5f32), ("f2".to_string(), 1.0)]);
        assert_eq!(spread_scores(&by_name, 4), vec![2.5, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn opening_a_missing_library_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let err = XgboostEngine::open(&dir.path().join("libxgboost.so"))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Library { .. }));
    }
}
