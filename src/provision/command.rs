use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One external program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Runs external programs for the provisioner.
pub trait CommandRunner {
    /// Run to completion with inherited stdio. Non-zero exit is an error.
    fn run(&mut self, command: &CommandSpec) -> Result<(), String>;
    /// Run and return stdout. Non-zero exit is an error.
    fn capture(&mut self, command: &CommandSpec) -> Result<String, String>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        command
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, spec: &CommandSpec) -> Result<(), String> {
        tracing::info!("Running `{spec}`");
        let status = Self::command(spec)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| format!("Failed to start `{spec}`: {err}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("`{spec}` exited with {status}"))
        }
    }

    fn capture(&mut self, spec: &CommandSpec) -> Result<String, String> {
        tracing::debug!("Capturing `{spec}`");
        let output = Self::command(spec)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| format!("Failed to start `{spec}`: {err}"))?;
        if !output.status.success() {
            return Err(format!("`{spec}` exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("cmake")
            .args(["-G", "Visual Studio 16 2019"])
            .arg("-A")
            .arg("x64");
        assert_eq!(spec.to_string(), "cmake -G \"Visual Studio 16 2019\" -A x64");
    }

    #[test]
    fn system_runner_reports_missing_programs() {
        let mut runner = SystemRunner;
        let err = runner
            .capture(&CommandSpec::new("xgbridge-definitely-not-a-program"))
            .unwrap_err();
        assert!(err.contains("Failed to start"), "{err}");
    }
}
