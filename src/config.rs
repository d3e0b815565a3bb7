//! `config.toml` loading for the engine and the provisioner.
//!
//! Every key is optional. A missing file yields defaults; a file that exists
//! but does not parse is an error rather than a silent fallback.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_XGBOOST_VERSION: &str = "1.7.5";
pub const DEFAULT_XGBOOST_REPO: &str = "https://github.com/dmlc/xgboost.git";
pub const DEFAULT_CMAKE_VERSION: &str = "3.23.2";
pub const DEFAULT_CMAKE_MIN_VERSION: &str = "3.18.0";

/// Errors raised while locating or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("No suitable config directory found")]
    NoConfigDir,
}

/// Top-level configuration document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub provision: ProvisionSettings,
}

/// Where to find the native engine library at runtime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Explicit path to the shared library, checked before any search.
    pub library_path: Option<PathBuf>,
}

/// What the provisioner does when an engine checkout already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingSourcePolicy {
    /// Ask on a terminal, abort when no terminal is attached.
    #[default]
    Prompt,
    Clean,
    Reuse,
    Abort,
}

/// Provisioner pins and download policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionSettings {
    pub xgboost_version: String,
    pub xgboost_repo: String,
    pub cmake_version: String,
    pub cmake_min_version: String,
    /// Directory holding the prebuilt Linux library. Defaults to `<exe dir>/prebuilt`.
    pub prebuilt_dir: Option<PathBuf>,
    pub on_existing_source: ExistingSourcePolicy,
    pub allowed_download_hosts: Vec<String>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            xgboost_version: DEFAULT_XGBOOST_VERSION.to_string(),
            xgboost_repo: DEFAULT_XGBOOST_REPO.to_string(),
            cmake_version: DEFAULT_CMAKE_VERSION.to_string(),
            cmake_min_version: DEFAULT_CMAKE_MIN_VERSION.to_string(),
            prebuilt_dir: None,
            on_existing_source: ExistingSourcePolicy::default(),
            allowed_download_hosts: vec![
                "cmake.org".to_string(),
                "github.com".to_string(),
                "objects.githubusercontent.com".to_string(),
            ],
        }
    }
}

impl ProvisionSettings {
    /// Resolve the prebuilt artifact directory, falling back to `<exe dir>/prebuilt`.
    pub fn resolved_prebuilt_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.prebuilt_dir {
            return Some(dir.clone());
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("prebuilt")))
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        for (key, value) in [
            ("cmake_version", &self.cmake_version),
            ("cmake_min_version", &self.cmake_min_version),
        ] {
            semver::Version::parse(value).map_err(|err| ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!("{key} '{value}' is not a version: {err}"),
            })?;
        }
        if self.xgboost_version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "xgboost_version must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root, returning defaults if the file is missing.
pub fn load_or_default() -> Result<AppConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load configuration from a specific file, returning defaults if it is missing.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    config.provision.validate(path)?;
    Ok(config)
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}
