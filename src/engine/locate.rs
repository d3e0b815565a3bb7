use std::path::{Path, PathBuf};

use crate::app_dirs;
use crate::config::EngineSettings;
use crate::platform;

use super::EngineError;

/// Environment variable naming the native library path directly.
pub const LIBRARY_ENV: &str = "XGBRIDGE_LIBRARY";

/// Library locations in the order they are tried.
pub fn candidate_paths(settings: &EngineSettings) -> Vec<PathBuf> {
    let env_path = std::env::var_os(LIBRARY_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    ordered_candidates(
        settings.library_path.as_deref(),
        env_path,
        app_dirs::lib_dir().ok(),
        exe_dir,
        platform::current_library_file_name(),
    )
}

/// Return the first candidate that exists on disk.
pub fn locate_library(settings: &EngineSettings) -> Result<PathBuf, EngineError> {
    let searched = candidate_paths(settings);
    match searched.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(EngineError::NotFound { searched }),
    }
}

fn ordered_candidates(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    app_lib_dir: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
    file_name: &str,
) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(4);
    paths.extend(explicit.map(Path::to_path_buf));
    paths.extend(env_path);
    paths.extend(app_lib_dir.map(|dir| dir.join(file_name)));
    paths.extend(exe_dir.map(|dir| dir.join("lib").join(file_name)));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_then_env_then_directories() {
        let paths = ordered_candidates(
            Some(Path::new("/cfg/libxgboost.so")),
            Some(PathBuf::from("/env/libxgboost.so")),
            Some(PathBuf::from("/home/u/.xgbridge/lib")),
            Some(PathBuf::from("/opt/app")),
            "libxgboost.so",
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/cfg/libxgboost.so"),
                PathBuf::from("/env/libxgboost.so"),
                PathBuf::from("/home/u/.xgbridge/lib/libxgboost.so"),
                PathBuf::from("/opt/app/lib/libxgboost.so"),
            ]
        );
    }

    #[test]
    fn skips_unset_sources() {
        let paths = ordered_candidates(None, None, None, Some(PathBuf::from("/opt/app")), "xgboost.dll");
        assert_eq!(paths, vec![PathBuf::from("/opt/app/lib/xgboost.dll")]);
    }

    #[test]
    fn explicit_library_that_exists_is_chosen() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("custom-xgboost.so");
        std::fs::write(&lib, b"elf").unwrap();
        let settings = EngineSettings {
            library_path: Some(lib.clone()),
        };
        assert_eq!(locate_library(&settings).unwrap(), lib);
    }
}
