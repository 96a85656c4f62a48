//! Config validation: checks with user-friendly error messages.

use crate::schema::HostConfig;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &HostConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_workspace(config, &mut report);
    validate_loader(config, &mut report);
    validate_webview(config, &mut report);
    report
}

fn validate_workspace(config: &HostConfig, report: &mut ValidationReport) {
    let ws = &config.workspace;
    match &ws.root {
        None => report.warn("workspace.root", "No workspace root configured; auto-discovery is disabled"),
        Some(root) if !root.is_dir() => report.error(
            "workspace.root",
            format!("Workspace root {} is not a directory", root.display()),
        ),
        Some(_) => {}
    }
    if ws.descriptor_file().trim().is_empty() {
        report.error("workspace.descriptorFile", "Descriptor file name cannot be empty");
    }
    if ws.probe_span() > 100 {
        report.warn(
            "workspace.probeSpan",
            format!("Probing {} ports per project will slow down scans", ws.probe_span()),
        );
    }
    if ws.source_extensions().is_empty() {
        report.warn("workspace.sourceExtensions", "No source extensions; project hot reload never fires");
    }
    if ws.debounce().is_zero() {
        report.warn("workspace.debounceMs", "A zero debounce reloads on every file event");
    }
}

fn validate_loader(config: &HostConfig, report: &mut ValidationReport) {
    let loader = &config.loader;
    let base = u32::from(loader.dev_port_base());
    let span = u32::from(loader.dev_port_span());
    if span == 0 {
        report.error("loader.devPortSpan", "devPortSpan must be > 0");
    }
    if base == 0 {
        report.error("loader.devPortBase", "devPortBase must be > 0");
    }
    if base + span > u32::from(u16::MAX) + 1 {
        report.error(
            "loader.devPortSpan",
            format!("Port range {base}..{} exceeds 65535", base + span),
        );
    }
    if loader.debounce().is_zero() {
        report.warn("loader.debounceMs", "A zero debounce reloads on every file event");
    }
}

fn validate_webview(config: &HostConfig, report: &mut ValidationReport) {
    if config.webview.host_window_url().trim().is_empty() {
        report.error("webview.hostWindowUrl", "Host window URL cannot be empty");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_only_warns_about_root() {
        let report = validate(&HostConfig::default());
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.path == "workspace.root"));
    }

    #[test]
    fn rejects_port_range_overflow() {
        let mut cfg = HostConfig::default();
        cfg.workspace.root = Some(std::env::temp_dir());
        cfg.loader.dev_port_base = Some(65000);
        cfg.loader.dev_port_span = Some(1000);
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "loader.devPortSpan");
    }

    #[test]
    fn rejects_missing_root_directory() {
        let mut cfg = HostConfig::default();
        cfg.workspace.root = Some("/definitely/not/here".into());
        let report = validate(&cfg);
        assert!(report.errors.iter().any(|e| e.path == "workspace.root"));
    }
}
