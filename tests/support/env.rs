use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes environment mutation across tests and restores the named
/// variables on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub fn preserve(vars: &[&str]) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let saved = vars
            .iter()
            .map(|var| (var.to_string(), std::env::var_os(var)))
            .collect();
        Self { saved, _lock: lock }
    }

    pub fn set(&self, var: &str, value: impl AsRef<std::ffi::OsStr>) {
        assert!(
            self.saved.iter().any(|(name, _)| name == var),
            "{var} is not preserved by this guard"
        );
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(var, value);
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (var, value) in self.saved.drain(..) {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(&var, value),
                    None => std::env::remove_var(&var),
                }
            }
        }
    }
}
