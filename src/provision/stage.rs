use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::platform::OsFamily;

/// Library search variable for families whose loader ignores relative paths.
pub const LINUX_LIBRARY_PATH_ENV: &str = "LD_LIBRARY_PATH";

/// Where the engine build may have left its shared library.
pub fn artifact_candidates(source_dir: &Path, build_dir: &Path, file_name: &str) -> Vec<PathBuf> {
    vec![
        source_dir.join("lib").join(file_name),
        build_dir.join("lib").join(file_name),
        build_dir.join("lib").join("Release").join(file_name),
        build_dir.join("Release").join(file_name),
    ]
}

pub fn find_artifact(source_dir: &Path, build_dir: &Path, file_name: &str) -> Result<PathBuf, String> {
    let candidates = artifact_candidates(source_dir, build_dir, file_name);
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| {
            let searched = candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("Build finished but {file_name} was not found (searched: {searched})")
        })
}

/// A library installed into the runtime directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedLibrary {
    pub path: PathBuf,
    pub sha256: String,
}

/// Copy `artifact` into `lib_dir` under the family's library name and clear
/// out libraries staged for other families.
pub fn stage_library(artifact: &Path, lib_dir: &Path, family: OsFamily) -> Result<StagedLibrary, String> {
    fs::create_dir_all(lib_dir)
        .map_err(|err| format!("Failed to create {}: {err}", lib_dir.display()))?;
    for foreign in family.foreign_library_names() {
        let path = lib_dir.join(foreign);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove stale {}: {err}", path.display()))?;
            tracing::info!("Removed library staged for another platform: {}", path.display());
        }
    }
    let dest = lib_dir.join(family.library_file_name());
    copy_file_atomic(artifact, &dest)
        .map_err(|err| format!("Failed to copy {} to {}: {err}", artifact.display(), dest.display()))?;
    let sha256 = sha256_file(&dest)
        .map_err(|err| format!("Failed to hash {}: {err}", dest.display()))?;
    tracing::info!("Staged {} (sha256 {sha256})", dest.display());
    Ok(StagedLibrary { path: dest, sha256 })
}

/// Prepend `dir` to the search-path variable `var` for this process.
///
/// Returns the new value.
pub fn prepend_search_path(var: &str, dir: &Path) -> Result<OsString, String> {
    let existing = std::env::var_os(var).unwrap_or_default();
    let joined = prepended(&existing, dir)?;
    // SAFETY: provisioning runs on a single thread that owns the process environment.
    unsafe { std::env::set_var(var, &joined) };
    Ok(joined)
}

fn prepended(existing: &OsString, dir: &Path) -> Result<OsString, String> {
    let mut paths = vec![dir.to_path_buf()];
    paths.extend(std::env::split_paths(existing).filter(|path| path != dir && !path.as_os_str().is_empty()));
    std::env::join_paths(paths).map_err(|err| format!("Cannot add {} to search path: {err}", dir.display()))
}

/// Shell line that reproduces the library search path for later sessions.
pub fn export_line(var: &str, dir: &Path) -> String {
    format!("export {var}=\"{}:${var}\"", dir.display())
}

fn copy_file_atomic(src: &Path, dest: &Path) -> std::io::Result<()> {
    let new_path = with_suffix(dest, "new");
    let old_path = with_suffix(dest, "old");
    if new_path.exists() {
        fs::remove_file(&new_path)?;
    }
    fs::copy(src, &new_path)?;
    if dest.exists() {
        fs::rename(dest, &old_path)?;
    }
    fs::rename(&new_path, dest)?;
    if old_path.exists() {
        // May still be mapped by a running process on Windows.
        let _ = fs::remove_file(&old_path);
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
