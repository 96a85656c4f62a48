//! URL-backed plugins rendered inline inside the host window.
//!
//! The manager owns no contexts of its own. Every operation is a directive
//! sent to the host window, which embeds, reloads or tears down the plugin
//! view itself.

use std::sync::Arc;

use plughost_core::{
    ConfigRepository, HostWindow, OpResult, PluginError, PluginResult, WebviewPluginConfig,
    WindowDirectory,
};
use plughost_logging::{PluginEvent, PluginEventLogger};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const LAUNCH_DIRECTIVE: &str = "webview-plugin:launch";
pub const CLOSE_DIRECTIVE: &str = "webview-plugin:close";
pub const INJECT_API_DIRECTIVE: &str = "webview-plugin:inject-api";
pub const RELOAD_DIRECTIVE: &str = "webview-plugin:reload";

#[derive(Clone)]
pub struct PluginWebviewManager {
    configs: ConfigRepository<WebviewPluginConfig>,
    windows: Arc<dyn WindowDirectory>,
    host_url: Arc<str>,
}

impl PluginWebviewManager {
    /// `host_url` is the address the host window is expected to show.
    pub fn new(windows: Arc<dyn WindowDirectory>, host_url: impl Into<String>) -> Self {
        Self::with_configs(ConfigRepository::new(), windows, host_url)
    }

    pub fn with_configs(
        configs: ConfigRepository<WebviewPluginConfig>,
        windows: Arc<dyn WindowDirectory>,
        host_url: impl Into<String>,
    ) -> Self {
        Self { configs, windows, host_url: Arc::from(host_url.into()) }
    }

    pub async fn register_webview_plugin(&self, config: WebviewPluginConfig) -> OpResult {
        let id = config.id.clone();
        if id.trim().is_empty() {
            return PluginError::InvalidConfig("plugin id is empty".into()).into();
        }
        if config.url.trim().is_empty() {
            warn!(plugin = %id, "Webview plugin registered without a url");
            return PluginError::InvalidConfig(format!("webview plugin {id} has no url")).into();
        }

        let url = config.url.clone();
        self.configs.insert(id.clone(), config).await;
        info!(plugin = %id, url = %url, "Webview plugin registered");
        PluginEventLogger::log_event(&id, PluginEvent::Registered { source: url });
        OpResult::ok(format!("webview plugin {id} registered"))
    }

    pub async fn unregister_webview_plugin(&self, id: &str) -> OpResult {
        match self.configs.remove(id).await {
            Some(_) => OpResult::ok(format!("webview plugin {id} unregistered")),
            None => PluginError::NotFound(id.into()).into(),
        }
    }

    pub async fn launch_webview_plugin(&self, id: &str) -> OpResult {
        let result = self
            .directive(id, LAUNCH_DIRECTIVE, |c| {
                json!({
                    "id": c.id,
                    "name": c.name,
                    "version": c.version,
                    "url": c.url,
                    "isDevelopment": c.is_development,
                    "permissions": c.manifest.permissions,
                })
            })
            .await;
        match result {
            Ok(config) => {
                PluginEventLogger::log_event(id, PluginEvent::Launched { source: config.url });
                OpResult::ok(format!("webview plugin {id} launched"))
            }
            Err(e) => self.failed(id, e),
        }
    }

    pub async fn close_webview_plugin(&self, id: &str) -> OpResult {
        match self.directive(id, CLOSE_DIRECTIVE, |c| json!({ "id": c.id })).await {
            Ok(_) => {
                PluginEventLogger::log_event(id, PluginEvent::Closed);
                OpResult::ok(format!("webview plugin {id} closed"))
            }
            Err(e) => self.failed(id, e),
        }
    }

    /// Hand the plugin its permitted API surface.
    pub async fn inject_plugin_api(&self, id: &str) -> OpResult {
        let result = self
            .directive(id, INJECT_API_DIRECTIVE, |c| {
                json!({ "id": c.id, "permissions": c.manifest.permissions })
            })
            .await;
        match result {
            Ok(_) => OpResult::ok(format!("api injected into webview plugin {id}")),
            Err(e) => self.failed(id, e),
        }
    }

    pub async fn reload_webview_plugin(&self, id: &str) -> OpResult {
        match self
            .directive(id, RELOAD_DIRECTIVE, |c| json!({ "id": c.id, "url": c.url }))
            .await
        {
            Ok(config) => {
                PluginEventLogger::log_event(id, PluginEvent::Reloaded { source: config.url });
                OpResult::ok(format!("webview plugin {id} reloaded"))
            }
            Err(e) => self.failed(id, e),
        }
    }

    pub async fn list_webview_plugins(&self) -> Vec<WebviewPluginConfig> {
        self.configs.values().await
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.configs.contains(id).await
    }

    /// Forget every registered plugin. Views inside the host window are left
    /// to the window itself.
    pub async fn cleanup(&self) {
        self.configs.clear().await;
        info!("Webview manager cleaned up");
    }

    async fn directive(
        &self,
        id: &str,
        channel: &str,
        payload: impl FnOnce(&WebviewPluginConfig) -> Value,
    ) -> PluginResult<WebviewPluginConfig> {
        let config = self
            .configs
            .get(id)
            .await
            .ok_or_else(|| PluginError::NotFound(id.into()))?;
        let window = self.host_window()?;
        window.send(channel, payload(&config))?;
        info!(plugin = %id, directive = %channel, "Directive sent to host window");
        Ok(config)
    }

    /// First window currently showing the host address.
    fn host_window(&self) -> PluginResult<Arc<dyn HostWindow>> {
        let expected = self.host_url.trim_end_matches('/');
        self.windows
            .windows()
            .into_iter()
            .find(|w| w.current_url().trim_end_matches('/') == expected)
            .ok_or(PluginError::HostWindowNotFound)
    }

    fn failed(&self, id: &str, err: PluginError) -> OpResult {
        warn!(plugin = %id, error = %err, "Webview plugin operation failed");
        err.into()
    }
}
