//! Operating system families and the native library naming each one uses.

use std::fmt;

/// Operating system families the native engine is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
}

impl OsFamily {
    pub const ALL: [OsFamily; 3] = [OsFamily::Linux, OsFamily::MacOs, OsFamily::Windows];

    /// Family of the running process, if supported.
    pub fn current() -> Option<Self> {
        Self::from_os_str(std::env::consts::OS)
    }

    pub fn from_os_str(os: &str) -> Option<Self> {
        match os {
            "linux" => Some(OsFamily::Linux),
            "macos" => Some(OsFamily::MacOs),
            "windows" => Some(OsFamily::Windows),
            _ => None,
        }
    }

    /// File name of the engine's shared library on this family.
    pub fn library_file_name(self) -> &'static str {
        match self {
            OsFamily::Linux => "libxgboost.so",
            OsFamily::MacOs => "libxgboost.dylib",
            OsFamily::Windows => "xgboost.dll",
        }
    }

    /// Library names staged for every other family.
    pub fn foreign_library_names(self) -> impl Iterator<Item = &'static str> {
        Self::ALL
            .into_iter()
            .filter(move |family| *family != self)
            .map(OsFamily::library_file_name)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::Windows => "windows",
        })
    }
}

/// Library name for the running platform, falling back to the Linux name.
pub fn current_library_file_name() -> &'static str {
    OsFamily::current()
        .unwrap_or(OsFamily::Linux)
        .library_file_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_os_names() {
        assert_eq!(OsFamily::from_os_str("linux"), Some(OsFamily::Linux));
        assert_eq!(OsFamily::from_os_str("macos"), Some(OsFamily::MacOs));
        assert_eq!(OsFamily::from_os_str("windows"), Some(OsFamily::Windows));
        assert_eq!(OsFamily::from_os_str("freebsd"), None);
    }

    #[test]
    fn foreign_names_exclude_own_library() {
        let names: Vec<_> = OsFamily::MacOs.foreign_library_names().collect();
        assert_eq!(names, vec!["libxgboost.so", "xgboost.dll"]);
    }
}
