use std::path::Path;

use crate::platform::OsFamily;

use super::command::CommandSpec;

const WINDOWS_GENERATOR: &str = "Visual Studio 16 2019";

/// Release shared-library build with every accelerator backend off.
pub fn configure_command(family: OsFamily, source_dir: &Path, build_dir: &Path) -> CommandSpec {
    let mut spec = CommandSpec::new("cmake")
        .arg("-S")
        .path_arg(source_dir)
        .arg("-B")
        .path_arg(build_dir);
    if family == OsFamily::Windows {
        spec = spec.args([
            "-G",
            WINDOWS_GENERATOR,
            "-A",
            "x64",
            "-DCMAKE_CONFIGURATION_TYPES=Release",
        ]);
    }
    spec.args([
        "-DCMAKE_BUILD_TYPE=Release",
        "-DBUILD_SHARED_LIBS=ON",
        "-DUSE_CUDA=OFF",
        "-DUSE_NCCL=OFF",
        "-DUSE_HIP=OFF",
    ])
}

/// Multi-config IDE build on Windows, parallel make elsewhere.
pub fn build_command(family: OsFamily, build_dir: &Path, jobs: usize) -> CommandSpec {
    match family {
        OsFamily::Windows => CommandSpec::new("cmake")
            .arg("--build")
            .path_arg(build_dir)
            .args(["--config", "Release"]),
        OsFamily::Linux | OsFamily::MacOs => CommandSpec::new("make")
            .arg(format!("-j{}", jobs.max(1)))
            .current_dir(build_dir),
    }
}

/// Processor count used for parallel builds.
pub fn available_jobs() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}
