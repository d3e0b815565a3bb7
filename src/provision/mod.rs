//! Native Dependency Provisioner.
//!
//! Produces the engine's shared library for the running platform and stages
//! it where [`crate::engine::locate_library`] looks for it. Linux uses the
//! prebuilt artifact when one ships; every other case fetches the pinned
//! source, builds it with CMake and copies the result into place.
//!
//! Failures name the stage that failed. Partial state (a half-built checkout,
//! a downloaded archive) is left on disk for the next run to reuse or clean.

mod archive;
mod command;
mod compile;
mod source;
mod stage;
mod toolchain;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use thiserror::Error;

use crate::app_dirs::{AppDirError, AppDirs};
use crate::config::ProvisionSettings;
use crate::platform::OsFamily;

pub use command::{CommandRunner, CommandSpec, SystemRunner};
pub use compile::{available_jobs, build_command, configure_command};
pub use source::{
    FixedDecider, NonInteractiveDecider, PromptDecider, SourceDecider, SourceDecision,
    default_decider,
};
pub use stage::{
    LINUX_LIBRARY_PATH_ENV, StagedLibrary, artifact_candidates, export_line, find_artifact,
    prepend_search_path, stage_library,
};
pub use toolchain::{
    Toolchain, cmake_asset_name, cmake_bin_dir, cmake_download_url, parse_cmake_version,
};

/// Pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStage {
    Platform,
    Toolchain,
    Fetch,
    Configure,
    Build,
    Stage,
    Environment,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisionStage::Platform => "platform",
            ProvisionStage::Toolchain => "toolchain",
            ProvisionStage::Fetch => "fetch",
            ProvisionStage::Configure => "configure",
            ProvisionStage::Build => "build",
            ProvisionStage::Stage => "stage",
            ProvisionStage::Environment => "environment",
        })
    }
}

/// A stage failed; provisioning stops.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {message}")]
pub struct ProvisionError {
    pub stage: ProvisionStage,
    pub message: String,
}

impl ProvisionError {
    pub fn new(stage: ProvisionStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Where the staged library came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    Prebuilt,
    Built,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Installed {
        library: StagedLibrary,
        source: ArtifactSource,
        /// Shell line the operator can use to register the library directory.
        export: Option<String>,
    },
    /// The operator chose to stop at the existing-checkout prompt.
    Cancelled,
}

/// Directories the provisioner reads from and writes into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionPaths {
    /// Runtime library directory the engine is staged into.
    pub lib_dir: PathBuf,
    /// Parent of engine source checkouts.
    pub deps_dir: PathBuf,
    /// Downloaded toolchains.
    pub tools_dir: PathBuf,
}

impl ProvisionPaths {
    pub fn from_app_dirs() -> Result<Self, AppDirError> {
        let dirs = AppDirs::discover()?;
        Ok(Self {
            lib_dir: dirs.lib()?,
            deps_dir: dirs.deps()?,
            tools_dir: dirs.tools()?,
        })
    }
}

/// Progress sink; receives one human-readable line per step.
pub type ProvisionProgress = Box<dyn FnMut(&str)>;

/// One provisioning run.
pub struct Provisioner {
    settings: ProvisionSettings,
    paths: ProvisionPaths,
    family: Option<OsFamily>,
    arch: String,
    jobs: usize,
    runner: Box<dyn CommandRunner>,
    decider: Box<dyn SourceDecider>,
    progress: ProvisionProgress,
}

enum SourceState {
    Ready(PathBuf),
    Cancelled,
}

impl Provisioner {
    /// Provisioner for the running platform with system commands and the
    /// decider selected by `settings.on_existing_source`.
    pub fn new(settings: ProvisionSettings, paths: ProvisionPaths) -> Self {
        let decider = default_decider(settings.on_existing_source);
        Self {
            settings,
            paths,
            family: OsFamily::current(),
            arch: std::env::consts::ARCH.to_string(),
            jobs: available_jobs(),
            runner: Box::new(SystemRunner),
            decider,
            progress: Box::new(|message| tracing::info!("{message}")),
        }
    }

    pub fn with_family(mut self, family: OsFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_decider(mut self, decider: impl SourceDecider + 'static) -> Self {
        self.decider = Box::new(decider);
        self
    }

    pub fn on_progress(mut self, progress: impl FnMut(&str) + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Checkout directory for the pinned engine version.
    pub fn source_dir(&self) -> PathBuf {
        self.paths
            .deps_dir
            .join(format!("xgboost-{}", self.settings.xgboost_version))
    }

    /// Run every stage for this platform.
    pub fn run(&mut self) -> Result<ProvisionOutcome, ProvisionError> {
        let family = self.family.ok_or_else(|| {
            ProvisionError::new(
                ProvisionStage::Platform,
                format!("Unsupported operating system '{}'", std::env::consts::OS),
            )
        })?;
        self.report(&format!(
            "Provisioning xgboost {} for {family}/{}",
            self.settings.xgboost_version, self.arch
        ));

        if family == OsFamily::Linux {
            match self.prebuilt_artifact(family) {
                Some(prebuilt) => {
                    self.report(&format!("Using prebuilt library {}", prebuilt.display()));
                    return self.finish(&prebuilt, family, ArtifactSource::Prebuilt);
                }
                None => {
                    tracing::warn!("No prebuilt library found; building from source");
                    self.report("No prebuilt library found, building from source");
                }
            }
        }

        self.ensure_toolchain(family)?;
        let source_dir = match self.ensure_source()? {
            SourceState::Ready(dir) => dir,
            SourceState::Cancelled => {
                self.report("Provisioning cancelled");
                return Ok(ProvisionOutcome::Cancelled);
            }
        };
        let build_dir = source_dir.join("build");

        self.report("Configuring native build");
        let configure = configure_command(family, &source_dir, &build_dir);
        self.runner
            .run(&configure)
            .map_err(|err| ProvisionError::new(ProvisionStage::Configure, err))?;

        self.report(&format!("Building with {} parallel jobs", self.jobs.max(1)));
        let build = build_command(family, &build_dir, self.jobs);
        self.runner
            .run(&build)
            .map_err(|err| ProvisionError::new(ProvisionStage::Build, err))?;

        let artifact = find_artifact(&source_dir, &build_dir, family.library_file_name())
            .map_err(|err| ProvisionError::new(ProvisionStage::Stage, err))?;
        self.finish(&artifact, family, ArtifactSource::Built)
    }

    fn report(&mut self, message: &str) {
        (self.progress)(message);
    }

    fn prebuilt_artifact(&self, family: OsFamily) -> Option<PathBuf> {
        let dir = self.settings.resolved_prebuilt_dir()?;
        let path = dir.join(family.library_file_name());
        path.is_file().then_some(path)
    }

    fn ensure_toolchain(&mut self, family: OsFamily) -> Result<(), ProvisionError> {
        let fail = |message: String| ProvisionError::new(ProvisionStage::Toolchain, message);
        let pinned = Version::parse(&self.settings.cmake_version)
            .map_err(|err| fail(format!("Invalid cmake_version: {err}")))?;
        let minimum = Version::parse(&self.settings.cmake_min_version)
            .map_err(|err| fail(format!("Invalid cmake_min_version: {err}")))?;
        let allowed_hosts: HashSet<String> =
            self.settings.allowed_download_hosts.iter().cloned().collect();
        let request = toolchain::ToolchainRequest {
            family,
            arch: &self.arch,
            pinned: &pinned,
            minimum: &minimum,
            tools_dir: &self.paths.tools_dir,
            allowed_hosts: &allowed_hosts,
        };
        let (found, bin_dir) =
            toolchain::ensure_cmake(&request, self.runner.as_mut(), self.progress.as_mut())
                .map_err(fail)?;
        tracing::info!("CMake toolchain: {found:?}");
        if let Some(bin_dir) = bin_dir {
            prepend_search_path("PATH", &bin_dir).map_err(fail)?;
            self.report(&format!("Added {} to PATH", bin_dir.display()));
        }
        Ok(())
    }

    fn ensure_source(&mut self) -> Result<SourceState, ProvisionError> {
        let fail = |message: String| ProvisionError::new(ProvisionStage::Fetch, message);
        let dir = self.source_dir();
        if dir.exists() {
            match self.decider.decide(&dir).map_err(fail)? {
                SourceDecision::Reuse => {
                    self.report(&format!("Reusing existing checkout at {}", dir.display()));
                    return Ok(SourceState::Ready(dir));
                }
                SourceDecision::Cancel => return Ok(SourceState::Cancelled),
                SourceDecision::Clean => {
                    self.report(&format!("Removing existing checkout at {}", dir.display()));
                    fs::remove_dir_all(&dir).map_err(|err| {
                        fail(format!("Failed to remove {}: {err}", dir.display()))
                    })?;
                }
            }
        }
        fs::create_dir_all(&self.paths.deps_dir).map_err(|err| {
            fail(format!(
                "Failed to create {}: {err}",
                self.paths.deps_dir.display()
            ))
        })?;
        self.report(&format!(
            "Fetching xgboost v{} from {}",
            self.settings.xgboost_version, self.settings.xgboost_repo
        ));
        let clone = CommandSpec::new("git")
            .args(["clone", "--recursive", "--branch"])
            .arg(format!("v{}", self.settings.xgboost_version))
            .arg(self.settings.xgboost_repo.clone())
            .path_arg(&dir);
        self.runner.run(&clone).map_err(fail)?;
        Ok(SourceState::Ready(dir))
    }

    fn finish(
        &mut self,
        artifact: &Path,
        family: OsFamily,
        source: ArtifactSource,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let library = stage_library(artifact, &self.paths.lib_dir, family)
            .map_err(|err| ProvisionError::new(ProvisionStage::Stage, err))?;
        self.report(&format!(
            "Installed {} (sha256 {})",
            library.path.display(),
            library.sha256
        ));
        let export = if family == OsFamily::Linux {
            prepend_search_path(LINUX_LIBRARY_PATH_ENV, &self.paths.lib_dir)
                .map_err(|err| ProvisionError::new(ProvisionStage::Environment, err))?;
            let line = export_line(LINUX_LIBRARY_PATH_ENV, &self.paths.lib_dir);
            self.report(&format!("Add this to your shell profile: {line}"));
            Some(line)
        } else {
            None
        };
        Ok(ProvisionOutcome::Installed {
            library,
            source,
            export,
        })
    }
}
