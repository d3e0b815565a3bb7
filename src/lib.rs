//! Safe, validated access to a native gradient-boosting engine, plus the
//! tooling that provisions the engine's shared library.

/// Application directory layout.
pub mod app_dirs;
/// `config.toml` loading.
pub mod config;
/// Native engine boundary and the dynamically loaded implementation.
pub mod engine;
/// Serialized model lifecycle over one native model slot.
pub mod gateway;
/// Shared HTTP agent and download helpers.
pub(crate) mod http_client;
/// Tracing subscriber setup.
pub mod logging;
/// Operating system families and native library names.
pub mod platform;
/// Fetch, build and stage the native engine library.
pub mod provision;
/// Input validation before anything reaches native code.
pub mod validation;
