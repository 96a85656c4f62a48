//! Config defaults: constants and the pass that writes them into a config.

use crate::schema::HostConfig;

pub const DEFAULT_DESCRIPTOR_FILE: &str = "package.json";

/// Delay before scanning a newly created project directory.
pub const DEFAULT_SETTLE_MS: u64 = 1000;

/// Reset-on-event reload debounce.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Ports probed above a candidate dev-server port.
pub const DEFAULT_PROBE_SPAN: u16 = 10;

pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "vue", "svelte", "html", "css", "scss", "json",
];

pub const DEFAULT_IGNORED_DIRS: &[&str] = &["node_modules", ".git", "dist"];

pub const DEFAULT_DEV_HOST: &str = "localhost";

pub const DEFAULT_DEV_PORT_BASE: u16 = 3000;

pub const DEFAULT_DEV_PORT_SPAN: u16 = 1000;

pub const DEFAULT_DEVELOPMENT_MODE: bool = true;

pub const DEFAULT_HOST_WINDOW_URL: &str = "plughost://app/index.html";

pub const DEFAULT_PLUGINS_DIR_NAME: &str = "plugins";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: HostConfig) -> HostConfig {
    let config = apply_workspace_defaults(config);
    let config = apply_loader_defaults(config);
    let config = apply_webview_defaults(config);
    apply_logging_defaults(config)
}

fn apply_workspace_defaults(mut config: HostConfig) -> HostConfig {
    let ws = &mut config.workspace;
    ws.descriptor_file.get_or_insert_with(|| DEFAULT_DESCRIPTOR_FILE.to_string());
    ws.settle_ms.get_or_insert(DEFAULT_SETTLE_MS);
    ws.debounce_ms.get_or_insert(DEFAULT_DEBOUNCE_MS);
    ws.probe_span.get_or_insert(DEFAULT_PROBE_SPAN);
    ws.dev_host.get_or_insert_with(|| DEFAULT_DEV_HOST.to_string());
    if ws.source_extensions.is_none() {
        ws.source_extensions = Some(DEFAULT_SOURCE_EXTENSIONS.iter().map(|e| e.to_string()).collect());
    }
    if ws.ignored_dirs.is_none() {
        ws.ignored_dirs = Some(DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect());
    }
    config
}

fn apply_loader_defaults(mut config: HostConfig) -> HostConfig {
    let loader = &mut config.loader;
    loader.development_mode.get_or_insert(DEFAULT_DEVELOPMENT_MODE);
    loader.debounce_ms.get_or_insert(DEFAULT_DEBOUNCE_MS);
    loader.dev_port_base.get_or_insert(DEFAULT_DEV_PORT_BASE);
    loader.dev_port_span.get_or_insert(DEFAULT_DEV_PORT_SPAN);
    loader.dev_host.get_or_insert_with(|| DEFAULT_DEV_HOST.to_string());
    if loader.watch_extensions.is_none() {
        loader.watch_extensions = Some(DEFAULT_SOURCE_EXTENSIONS.iter().map(|e| e.to_string()).collect());
    }
    config
}

fn apply_webview_defaults(mut config: HostConfig) -> HostConfig {
    config
        .webview
        .host_window_url
        .get_or_insert_with(|| DEFAULT_HOST_WINDOW_URL.to_string());
    config
}

fn apply_logging_defaults(mut config: HostConfig) -> HostConfig {
    config
        .logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_unset_fields() {
        let cfg = apply_all_defaults(HostConfig::default());
        assert_eq!(cfg.workspace.settle_ms, Some(DEFAULT_SETTLE_MS));
        assert_eq!(cfg.loader.dev_port_span, Some(DEFAULT_DEV_PORT_SPAN));
        assert_eq!(cfg.logging.level.as_deref(), Some("info"));
    }

    #[test]
    fn does_not_override_user_values() {
        let mut cfg = HostConfig::default();
        cfg.loader.debounce_ms = Some(25);
        cfg.loader.development_mode = Some(false);
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.loader.debounce_ms, Some(25));
        assert_eq!(cfg.loader.development_mode, Some(false));
    }
}
