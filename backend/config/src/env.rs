//! Environment variable overrides.
//!
//! `PLUGHOST_WORKSPACE`, `PLUGHOST_LOG_LEVEL`, `PLUGHOST_DEV_MODE`, and
//! `PLUGHOST_HOST_WINDOW_URL` replace the matching config values.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::schema::HostConfig;

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: HostConfig) -> HostConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(mut config: HostConfig, env: &HashMap<String, String>) -> HostConfig {
    let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(root) = get("PLUGHOST_WORKSPACE") {
        config.workspace.root = Some(PathBuf::from(root));
    }
    if let Some(level) = get("PLUGHOST_LOG_LEVEL") {
        config.logging.level = Some(level.to_string());
    }
    if let Some(url) = get("PLUGHOST_HOST_WINDOW_URL") {
        config.webview.host_window_url = Some(url.to_string());
    }
    if let Some(raw) = get("PLUGHOST_DEV_MODE") {
        match parse_bool(raw) {
            Some(enabled) => config.loader.development_mode = Some(enabled),
            None => warn!(value = %raw, "Ignoring unparseable PLUGHOST_DEV_MODE"),
        }
    }
    config
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
