//! Application directory layout anchored to a single `.xgbridge` folder.
//!
//! The folder lives under the OS config directory (e.g., `%APPDATA%` on
//! Windows) unless `XGBRIDGE_HOME` names another base. Every accessor creates
//! its directory on first use.
//!
//! ```text
//! .xgbridge/
//!   config.toml
//!   logs/     per-run log files
//!   lib/      staged native engine library
//!   deps/     engine source checkouts
//!   tools/    downloaded CMake
//! ```

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the base directory.
pub const APP_DIR_NAME: &str = ".xgbridge";
/// Environment variable that replaces the OS config directory as the base.
pub const HOME_ENV: &str = "XGBRIDGE_HOME";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved `.xgbridge` root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    /// Root under `XGBRIDGE_HOME` when set and non-blank, else the OS config directory.
    pub fn discover() -> Result<Self, AppDirError> {
        let base = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
            .ok_or(AppDirError::NoBaseDir)?;
        Ok(Self::under(&base))
    }

    /// Root inside an explicit base directory.
    pub fn under(base: &Path) -> Self {
        Self {
            root: base.join(APP_DIR_NAME),
        }
    }

    pub fn root(&self) -> Result<PathBuf, AppDirError> {
        ensure(self.root.clone())
    }

    pub fn logs(&self) -> Result<PathBuf, AppDirError> {
        ensure(self.root.join("logs"))
    }

    pub fn lib(&self) -> Result<PathBuf, AppDirError> {
        ensure(self.root.join("lib"))
    }

    pub fn deps(&self) -> Result<PathBuf, AppDirError> {
        ensure(self.root.join("deps"))
    }

    pub fn tools(&self) -> Result<PathBuf, AppDirError> {
        ensure(self.root.join("tools"))
    }
}

/// Discovered root directory, created if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::discover()?.root()
}

pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::discover()?.logs()
}

/// Runtime library directory the native engine is staged into and loaded from.
pub fn lib_dir() -> Result<PathBuf, AppDirError> {
    AppDirs::discover()?.lib()
}

fn ensure(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn children_live_under_the_root() {
        let base = tempdir().unwrap();
        let dirs = AppDirs::under(base.path());
        let root = dirs.root().unwrap();
        assert_eq!(root, base.path().join(APP_DIR_NAME));
        assert!(root.is_dir());
        assert_eq!(dirs.lib().unwrap(), root.join("lib"));
        assert_eq!(dirs.deps().unwrap(), root.join("deps"));
        assert_eq!(dirs.logs().unwrap(), root.join("logs"));
        let tools = dirs.tools().unwrap();
        assert_eq!(tools, root.join("tools"));
        assert!(tools.is_dir());
    }

    #[test]
    fn accessors_report_unwritable_base() {
        let base = tempdir().unwrap();
        let file = base.path().join("occupied");
        std::fs::write(&file, "").unwrap();
        let dirs = AppDirs::under(&file);
        assert!(matches!(dirs.lib(), Err(AppDirError::CreateDir { .. })));
    }
}
