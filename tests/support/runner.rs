use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use xgbridge::provision::{CommandRunner, CommandSpec};

/// Records every command instead of running it.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    cmake_version: Option<String>,
    failing: Option<(String, String)>,
    build_output: Option<PathBuf>,
}

impl RecordingRunner {
    /// `cmake --version` reports `version`; without this cmake looks absent.
    pub fn with_cmake(mut self, version: &str) -> Self {
        self.cmake_version = Some(format!("cmake version {version}\n\nCMake suite maintained by Kitware.\n"));
        self
    }

    /// Fail the first command whose program and first argument match.
    pub fn failing_on(mut self, program: &str, first_arg: &str) -> Self {
        self.failing = Some((program.to_string(), first_arg.to_string()));
        self
    }

    /// Write a fake shared library at `path` when the build command runs.
    pub fn producing(mut self, path: PathBuf) -> Self {
        self.build_output = Some(path);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| match call.args.first() {
                Some(first) => format!("{} {first}", call.program),
                None => call.program.clone(),
            })
            .collect()
    }

    fn record(&self, spec: &CommandSpec) -> Result<(), String> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some((program, first)) = &self.failing {
            if spec.program == *program && spec.args.first() == Some(first) {
                return Err(format!("`{spec}` exited with exit status: 1"));
            }
        }
        Ok(())
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, spec: &CommandSpec) -> Result<(), String> {
        self.record(spec)?;
        let is_build = spec.program == "make"
            || (spec.program == "cmake" && spec.args.first().map(String::as_str) == Some("--build"));
        if spec.program == "git" {
            if let Some(dir) = spec.args.last() {
                std::fs::create_dir_all(dir).map_err(|err| err.to_string())?;
            }
        } else if is_build {
            if let Some(path) = &self.build_output {
                std::fs::create_dir_all(path.parent().unwrap()).map_err(|err| err.to_string())?;
                std::fs::write(path, b"native library").map_err(|err| err.to_string())?;
            }
        }
        Ok(())
    }

    fn capture(&mut self, spec: &CommandSpec) -> Result<String, String> {
        self.record(spec)?;
        if spec.program == "cmake" {
            return self
                .cmake_version
                .clone()
                .ok_or_else(|| "Failed to start `cmake --version`: not found".to_string());
        }
        Ok(String::new())
    }
}
