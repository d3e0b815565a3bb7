//! Fetches, builds and stages the native engine library for this machine.
//!
//! Takes no flags; everything is detected from the OS and `config.toml`.
//! Exits 0 when the library is staged or the operator cancels, 1 on any
//! stage failure.

use std::process::ExitCode;

use xgbridge::config;
use xgbridge::logging;
use xgbridge::provision::{ProvisionOutcome, ProvisionPaths, Provisioner};

fn main() -> ExitCode {
    if let Err(err) = logging::init_for("xgbridge-provision") {
        eprintln!("Logging disabled: {err}");
    }
    finish(try_main())
}

fn try_main() -> Result<ProvisionOutcome, String> {
    let config = config::load_or_default().map_err(|err| err.to_string())?;
    let paths = ProvisionPaths::from_app_dirs().map_err(|err| err.to_string())?;
    let mut provisioner = Provisioner::new(config.provision, paths);
    provisioner.run().map_err(|err| err.to_string())
}

/// Report the outcome and map it to the process exit status.
fn finish(result: Result<ProvisionOutcome, String>) -> ExitCode {
    match result {
        Ok(ProvisionOutcome::Installed { library, .. }) => {
            println!("Native engine ready: {}", library.path.display());
            ExitCode::SUCCESS
        }
        Ok(ProvisionOutcome::Cancelled) => {
            println!("Provisioning cancelled.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Provisioning failed: {err}");
            eprintln!("Provisioning failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use xgbridge::provision::{ArtifactSource, StagedLibrary};

    #[test]
    fn installed_and_cancelled_exit_zero() {
        let installed = ProvisionOutcome::Installed {
            library: StagedLibrary {
                path: PathBuf::from("/tmp/lib/libxgboost.so"),
                sha256: "00".repeat(32),
            },
            source: ArtifactSource::Prebuilt,
            export: None,
        };
        assert_eq!(finish(Ok(installed)), ExitCode::SUCCESS);
        assert_eq!(finish(Ok(ProvisionOutcome::Cancelled)), ExitCode::SUCCESS);
    }

    #[test]
    fn stage_failure_exits_nonzero() {
        let failed = finish(Err("Build stage failed: make exited with 2".to_string()));
        assert_eq!(failed, ExitCode::FAILURE);
    }
}
