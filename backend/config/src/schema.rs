//! plughost runtime configuration schema.
//!
//! Every leaf is optional so a partial YAML file parses; the accessors fall
//! back to the constants in [`crate::defaults`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the plugin host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Workspace auto-discovery
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Dev-mode plugin loader
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Inline webview plugins
    #[serde(default)]
    pub webview: WebviewConfig,

    /// Installed plugins
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Directory whose immediate subdirectories are candidate projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Project descriptor file name (default `package.json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor_file: Option<String>,
    /// Delay before scanning a newly created project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,
    /// Quiet period before a source change triggers a reload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// How many ports above the candidate to probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_span: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_dirs: Option<Vec<String>>,
    /// Host used in discovered dev-server URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_host: Option<String>,
}

impl WorkspaceConfig {
    pub fn descriptor_file(&self) -> &str {
        self.descriptor_file.as_deref().unwrap_or(DEFAULT_DESCRIPTOR_FILE)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms.unwrap_or(DEFAULT_SETTLE_MS))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    pub fn probe_span(&self) -> u16 {
        self.probe_span.unwrap_or(DEFAULT_PROBE_SPAN)
    }

    pub fn source_extensions(&self) -> Vec<String> {
        self.source_extensions
            .clone()
            .unwrap_or_else(|| to_strings(DEFAULT_SOURCE_EXTENSIONS))
    }

    pub fn ignored_dirs(&self) -> Vec<String> {
        self.ignored_dirs
            .clone()
            .unwrap_or_else(|| to_strings(DEFAULT_IGNORED_DIRS))
    }

    pub fn dev_host(&self) -> &str {
        self.dev_host.as_deref().unwrap_or(DEFAULT_DEV_HOST)
    }
}

// ---------------------------------------------------------------------------
// Dev loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Watch registered dev plugins and hot-reload on change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// First port of the range dev-server addresses are hashed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_port_base: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_port_span: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_extensions: Option<Vec<String>>,
}

impl LoaderConfig {
    pub fn development_mode(&self) -> bool {
        self.development_mode.unwrap_or(DEFAULT_DEVELOPMENT_MODE)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    pub fn dev_port_base(&self) -> u16 {
        self.dev_port_base.unwrap_or(DEFAULT_DEV_PORT_BASE)
    }

    pub fn dev_port_span(&self) -> u16 {
        self.dev_port_span.unwrap_or(DEFAULT_DEV_PORT_SPAN)
    }

    pub fn dev_host(&self) -> &str {
        self.dev_host.as_deref().unwrap_or(DEFAULT_DEV_HOST)
    }

    pub fn watch_extensions(&self) -> Vec<String> {
        self.watch_extensions
            .clone()
            .unwrap_or_else(|| to_strings(DEFAULT_SOURCE_EXTENSIONS))
    }
}

// ---------------------------------------------------------------------------
// Webview / plugins / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebviewConfig {
    /// Address the host window is expected to have loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_window_url: Option<String>,
}

impl WebviewConfig {
    pub fn host_window_url(&self) -> &str {
        self.host_window_url.as_deref().unwrap_or(DEFAULT_HOST_WINDOW_URL)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    /// Where installed plugins live (default `<config dir>/plugins`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl PluginsConfig {
    pub fn dir(&self, config_dir: &Path) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| config_dir.join(DEFAULT_PLUGINS_DIR_NAME))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for rolling NDJSON logs; console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_parses_with_defaults() {
        let yaml = "workspace:\n  root: /tmp/ws\n  settleMs: 50\nloader:\n  developmentMode: false\n";
        let cfg: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.workspace.root.as_deref(), Some(Path::new("/tmp/ws")));
        assert_eq!(cfg.workspace.settle_delay(), Duration::from_millis(50));
        assert_eq!(cfg.workspace.descriptor_file(), "package.json");
        assert!(!cfg.loader.development_mode());
        assert_eq!(cfg.loader.dev_port_base(), DEFAULT_DEV_PORT_BASE);
        assert_eq!(cfg.webview.host_window_url(), DEFAULT_HOST_WINDOW_URL);
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: HostConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, HostConfig::default());
        assert!(cfg.workspace.source_extensions().contains(&"tsx".to_string()));
    }
}
