//! `plughost-config`: plugin host runtime configuration.
//!
//! Provides:
//! - Typed config schema (workspace discovery, dev loader, webview host, logging)
//! - YAML read/write
//! - `PLUGHOST_*` environment overrides
//! - Default value application
//! - Validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{config_dir, config_file_path, load_config, write_config};
pub use schema::{HostConfig, LoaderConfig, LoggingConfig, PluginsConfig, WebviewConfig, WorkspaceConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Load, apply env overrides, apply defaults, and validate a config file.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<HostConfig> {
    let config = load_config(path).await?;
    let config = apply_env_overrides(config);
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }

    Ok(config)
}
