use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;

use url::Url;

use super::command::{CommandRunner, CommandSpec};

const MAX_ZIP_ENTRIES: usize = 20_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const MAX_ZIP_COMPRESSION_RATIO: u64 = 200;

#[derive(Clone, Copy)]
struct ZipLimits {
    max_entries: usize,
    max_entry_bytes: u64,
    max_total_bytes: u64,
    max_ratio: u64,
}

impl ZipLimits {
    fn standard() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_ratio: MAX_ZIP_COMPRESSION_RATIO,
        }
    }
}

/// Require `https` and a host from `allowed_hosts`.
pub(crate) fn validate_download_url(raw: &str, allowed_hosts: &HashSet<String>) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|err| format!("Invalid download URL {raw}: {err}"))?;
    if url.scheme() != "https" {
        return Err(format!("Download URL must use https: {raw}"));
    }
    let host = url
        .host_str()
        .ok_or_else(|| format!("Download URL is missing a host: {raw}"))?;
    if !allowed_hosts.contains(host) {
        return Err(format!(
            "Download host '{host}' is not allowlisted; add it to allowed_download_hosts"
        ));
    }
    Ok(url)
}

/// Extract `archive` into `dest_dir`, picking the method from the file name.
pub(crate) fn extract(
    archive: &Path,
    dest_dir: &Path,
    runner: &mut dyn CommandRunner,
) -> Result<(), String> {
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with(".zip") {
        unzip_to_dir(archive, dest_dir, ZipLimits::standard())
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        runner.run(
            &CommandSpec::new("tar")
                .arg("xzf")
                .path_arg(archive)
                .arg("-C")
                .path_arg(dest_dir),
        )
    } else {
        Err(format!("Unsupported archive format: {name}"))
    }
}

#[cfg(unix)]
fn safe_unix_file_mode(archive_mode: u32) -> u32 {
    if archive_mode & 0o111 != 0 { 0o755 } else { 0o644 }
}

fn unzip_to_dir(zip_path: &Path, dest_dir: &Path, limits: ZipLimits) -> Result<(), String> {
    let zip_error = |err: zip::result::ZipError| format!("Invalid zip {}: {err}", zip_path.display());
    let io_error = |err: std::io::Error| format!("Failed to extract {}: {err}", zip_path.display());
    let file = File::open(zip_path).map_err(io_error)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;
    if archive.len() > limits.max_entries {
        return Err(format!(
            "Archive has {} entries, limit is {}",
            archive.len(),
            limits.max_entries
        ));
    }
    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(zip_error)?;
        let size = entry.size();
        if size > limits.max_entry_bytes {
            return Err(format!(
                "Archive entry '{}' is too large ({size} bytes)",
                entry.name()
            ));
        }
        if size > 0 && size > entry.compressed_size().saturating_mul(limits.max_ratio) {
            return Err(format!(
                "Archive entry '{}' exceeds compression ratio limit",
                entry.name()
            ));
        }
        total = total.saturating_add(size);
        if total > limits.max_total_bytes {
            return Err(format!("Archive extracted size exceeds {} bytes", limits.max_total_bytes));
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping archive entry with unsafe path '{}'", entry.name());
            continue;
        };
        let outpath = dest_dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(io_error)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut outfile = File::create(&outpath).map_err(io_error)?;
        std::io::copy(&mut entry, &mut outfile).map_err(io_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(safe_unix_file_mode(mode)))
                    .map_err(io_error)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn hosts(values: &[&str]) -> HashSet<String> {
        values.iter().map(|host| host.to_string()).collect()
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn download_url_requires_https_and_allowlisted_host() {
        let allowed = hosts(&["cmake.org"]);
        assert!(validate_download_url("https://cmake.org/files/v3.23/x.zip", &allowed).is_ok());
        let err = validate_download_url("http://cmake.org/files/x.zip", &allowed).unwrap_err();
        assert!(err.contains("https"), "{err}");
        let err = validate_download_url("https://evil.test/x.zip", &allowed).unwrap_err();
        assert!(err.contains("allowlisted"), "{err}");
        assert!(validate_download_url("not a url", &allowed).is_err());
    }

    #[test]
    fn unzips_nested_entries() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("cmake.zip");
        write_zip(
            &zip_path,
            &[
                ("cmake-3.23.2-windows-x86_64/bin/cmake.exe", b"exe"),
                ("cmake-3.23.2-windows-x86_64/share/readme.txt", b"docs"),
            ],
        );
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let mut runner = super::super::command::SystemRunner;
        extract(&zip_path, &out, &mut runner).unwrap();
        assert_eq!(
            fs::read(out.join("cmake-3.23.2-windows-x86_64/bin/cmake.exe")).unwrap(),
            b"exe"
        );
    }

    #[test]
    fn zip_entry_limit_is_enforced() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("many.zip");
        write_zip(&zip_path, &[("a.txt", b"a"), ("b.txt", b"b")]);
        let limits = ZipLimits {
            max_entries: 1,
            ..ZipLimits::standard()
        };
        let err = unzip_to_dir(&zip_path, dir.path(), limits).unwrap_err();
        assert!(err.contains("entries"), "{err}");
    }

    #[test]
    fn rejects_unknown_archive_formats() {
        let dir = tempdir().unwrap();
        let mut runner = super::super::command::SystemRunner;
        let err = extract(&dir.path().join("cmake.rar"), dir.path(), &mut runner).unwrap_err();
        assert!(err.contains("Unsupported"), "{err}");
    }
}
