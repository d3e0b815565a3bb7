//! Build-configuration toolchain (CMake) discovery and acquisition.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::http_client::{self, DownloadPolicy};
use crate::platform::OsFamily;

use super::archive;
use super::command::{CommandRunner, CommandSpec};

const MAX_TOOLCHAIN_ARCHIVE_BYTES: u64 = 512 * 1024 * 1024;

/// How the build toolchain was made available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Toolchain {
    /// A recent enough `cmake` is already on `PATH`.
    System(Version),
    /// A previously downloaded copy under the tools directory.
    Cached(PathBuf),
    /// Freshly downloaded into the tools directory.
    Downloaded(PathBuf),
}

/// Extract the version from `cmake --version` output.
pub fn parse_cmake_version(output: &str) -> Option<Version> {
    let line = output.lines().find(|line| line.contains("version"))?;
    let raw = line.split_whitespace().last()?;
    // Builds such as `3.22.1-dirty` or `3.28.0-rc2` carry suffixes.
    let core: String = raw
        .chars()
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    let mut parts = core.split('.').filter(|part| !part.is_empty());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some(Version::new(major, minor, patch))
}

/// Release asset name for the pinned CMake version.
pub fn cmake_asset_name(version: &Version, family: OsFamily, arch: &str) -> Result<String, String> {
    let platform = match (family, arch) {
        (OsFamily::Linux, "x86_64") => "linux-x86_64",
        (OsFamily::Linux, "aarch64") => "linux-aarch64",
        (OsFamily::MacOs, _) => "macos-universal",
        (OsFamily::Windows, "x86_64") => "windows-x86_64",
        (OsFamily::Windows, "aarch64") => "windows-arm64",
        _ => return Err(format!("No CMake release for {family}/{arch}")),
    };
    let extension = if family == OsFamily::Windows { "zip" } else { "tar.gz" };
    Ok(format!("cmake-{version}-{platform}.{extension}"))
}

/// Download URL for the pinned CMake version.
pub fn cmake_download_url(version: &Version, family: OsFamily, arch: &str) -> Result<String, String> {
    Ok(format!(
        "https://cmake.org/files/v{}.{}/{}",
        version.major,
        version.minor,
        cmake_asset_name(version, family, arch)?
    ))
}

/// Executable directory of an unpacked CMake distribution.
///
/// macOS archives nest the binaries inside an application bundle.
pub fn cmake_bin_dir(root: &Path) -> PathBuf {
    let bundle = root.join("CMake.app").join("Contents").join("bin");
    if bundle.is_dir() {
        bundle
    } else {
        root.join("bin")
    }
}

fn cmake_executable(family: OsFamily) -> &'static str {
    if family == OsFamily::Windows {
        "cmake.exe"
    } else {
        "cmake"
    }
}

pub(crate) struct ToolchainRequest<'a> {
    pub family: OsFamily,
    pub arch: &'a str,
    pub pinned: &'a Version,
    pub minimum: &'a Version,
    pub tools_dir: &'a Path,
    pub allowed_hosts: &'a HashSet<String>,
}

/// Result of probing and, when needed, fetching CMake.
///
/// The caller puts the returned bin directory (if any) on `PATH`.
pub(crate) fn ensure_cmake(
    request: &ToolchainRequest<'_>,
    runner: &mut dyn CommandRunner,
    progress: &mut dyn FnMut(&str),
) -> Result<(Toolchain, Option<PathBuf>), String> {
    match runner.capture(&CommandSpec::new("cmake").arg("--version")) {
        Ok(output) => match parse_cmake_version(&output) {
            Some(version) if version >= *request.minimum => {
                progress(&format!("Using installed CMake {version}"));
                return Ok((Toolchain::System(version), None));
            }
            Some(version) => progress(&format!(
                "Installed CMake {version} is older than {}",
                request.minimum
            )),
            None => tracing::warn!("Could not parse `cmake --version` output: {output}"),
        },
        Err(err) => {
            tracing::info!("CMake not found on PATH: {err}");
            progress("CMake not found");
        }
    }

    let install_dir = request.tools_dir.join("cmake");
    let bin_dir = cmake_bin_dir(&install_dir);
    if bin_dir.join(cmake_executable(request.family)).is_file() {
        progress("Using previously downloaded CMake");
        return Ok((Toolchain::Cached(install_dir), Some(bin_dir)));
    }

    let url = cmake_download_url(request.pinned, request.family, request.arch)?;
    archive::validate_download_url(&url, request.allowed_hosts)?;
    fs::create_dir_all(request.tools_dir)
        .map_err(|err| format!("Failed to create {}: {err}", request.tools_dir.display()))?;
    let asset = cmake_asset_name(request.pinned, request.family, request.arch)?;
    let archive_path = request.tools_dir.join(&asset);
    progress(&format!("Downloading CMake from {url}"));
    http_client::download_to_path(
        &url,
        &archive_path,
        &DownloadPolicy::with_limit(MAX_TOOLCHAIN_ARCHIVE_BYTES),
    )?;

    progress("Extracting CMake");
    let staging = tempfile::tempdir_in(request.tools_dir)
        .map_err(|err| format!("Failed to create staging directory: {err}"))?;
    archive::extract(&archive_path, staging.path(), runner)?;
    let extracted = single_root(staging.path())?;
    install_extracted(&extracted, &install_dir)?;
    if let Err(err) = fs::remove_file(&archive_path) {
        tracing::warn!("Failed to remove {}: {err}", archive_path.display());
    }
    let bin_dir = cmake_bin_dir(&install_dir);
    Ok((Toolchain::Downloaded(install_dir), Some(bin_dir)))
}

fn single_root(staging: &Path) -> Result<PathBuf, String> {
    let mut dirs = fs::read_dir(staging)
        .map_err(|err| format!("Failed to read {}: {err}", staging.display()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir());
    match (dirs.next(), dirs.next()) {
        (Some(root), None) => Ok(root),
        _ => Err("CMake archive did not contain a single top-level directory".into()),
    }
}

fn install_extracted(extracted: &Path, install_dir: &Path) -> Result<(), String> {
    if install_dir.exists() {
        fs::remove_dir_all(install_dir)
            .map_err(|err| format!("Failed to remove {}: {err}", install_dir.display()))?;
    }
    fs::rename(extracted, install_dir)
        .map_err(|err| format!("Failed to move CMake into {}: {err}", install_dir.display()))
}
