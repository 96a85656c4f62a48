//! `plughost doctor`: check the config and the directories it points at.

use anyhow::{bail, Result};
use plughost_config::{validate, HostConfig};

use crate::config::ConfigLocation;

pub async fn run(config: &HostConfig, location: &ConfigLocation) -> Result<()> {
    println!("Config file: {}", location.file.display());
    if !location.file.exists() {
        println!("  (not found; built-in defaults apply)");
    }

    let report = validate(config);
    for warning in &report.warnings {
        println!("  warn  {}: {}", warning.path, warning.message);
    }
    for error in &report.errors {
        println!("  error {}: {}", error.path, error.message);
    }

    let plugins_dir = location.plugins_dir(config);
    if plugins_dir.is_dir() {
        println!("Plugins directory: {}", plugins_dir.display());
    } else {
        println!("Plugins directory: {} (missing; created on first install)", plugins_dir.display());
    }
    match &config.workspace.root {
        Some(root) => println!("Workspace root: {}", root.display()),
        None => println!("Workspace root: not configured"),
    }
    println!("Host window: {}", config.webview.host_window_url());
    println!(
        "Development mode: {}",
        if config.loader.development_mode() { "on" } else { "off" }
    );

    if !report.is_valid() {
        bail!("{} config error(s)", report.errors.len());
    }
    println!("All checks passed.");
    Ok(())
}
