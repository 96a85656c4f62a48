//! Wires the plugin host components together over headless collaborators.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use plughost_config::HostConfig;
use plughost_core::headless::{HeadlessSandbox, HeadlessWindow, InMemoryBridge, StaticWindowDirectory};
use plughost_core::{MessageBridge, OpResult, SandboxService};
use plughost_plugins::{
    CommandRouter, DirectoryInstaller, MemoryPluginStore, PluginDevLoader, PluginManager,
    PluginWebviewManager,
};
use plughost_workspace::{TcpPortProbe, WorkspaceScanner};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{loader_settings, scanner_settings, ConfigLocation};

/// One request line: `{"command": "...", "payload": ...}`.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Deserialize)]
struct MessagePayload {
    id: String,
    channel: String,
    #[serde(default)]
    payload: Value,
}

pub struct Host {
    pub loader: PluginDevLoader,
    pub webview: PluginWebviewManager,
    pub scanner: WorkspaceScanner,
    pub manager: PluginManager,
    pub router: CommandRouter,
}

impl Host {
    pub async fn build(config: &HostConfig, location: &ConfigLocation) -> Result<Self> {
        let sandbox: Arc<dyn SandboxService> = Arc::new(HeadlessSandbox::new());
        let bridge: Arc<dyn MessageBridge> = Arc::new(InMemoryBridge::new());

        let host_url = config.webview.host_window_url();
        let windows = Arc::new(StaticWindowDirectory::new());
        windows.add(Arc::new(HeadlessWindow::new(host_url)));

        let loader = PluginDevLoader::new(sandbox.clone(), bridge.clone(), loader_settings(config));
        let webview = PluginWebviewManager::new(windows, host_url);
        let scanner = WorkspaceScanner::new(
            loader.clone(),
            webview.clone(),
            Arc::new(TcpPortProbe::default()),
            scanner_settings(config),
        );

        let plugins_dir = location.plugins_dir(config);
        let store = Arc::new(MemoryPluginStore::new());
        let discovered = store
            .discover(&plugins_dir)
            .await
            .with_context(|| format!("discover plugins in {}", plugins_dir.display()))?;
        info!(dir = %plugins_dir.display(), discovered, "Plugin store ready");
        let manager = PluginManager::new(
            store,
            Arc::new(DirectoryInstaller::new(plugins_dir)),
            sandbox,
            bridge,
        );

        let router = CommandRouter::new(loader.clone(), webview.clone());
        Ok(Self { loader, webview, scanner, manager, router })
    }

    /// Handle one request line and return the JSON reply.
    pub async fn handle_line(&self, line: &str) -> Value {
        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => return reply(OpResult::fail(format!("malformed request: {e}"))),
        };
        match request.command.split_once(':') {
            Some(("plugin", op)) => self.handle_plugin(op, request.payload).await,
            _ => self.router.dispatch(&request.command, request.payload).await,
        }
    }

    async fn handle_plugin(&self, op: &str, payload: Value) -> Value {
        if op == "list" {
            return serde_json::to_value(self.manager.list_plugins().await).unwrap_or(Value::Null);
        }
        if op == "send" {
            return match serde_json::from_value::<MessagePayload>(payload) {
                Ok(m) => reply(self.manager.send_message_to_plugin(&m.id, &m.channel, m.payload).await),
                Err(e) => reply(OpResult::fail(format!("malformed payload: {e}"))),
            };
        }
        let id = match payload {
            Value::String(id) => id,
            Value::Object(ref map) => match map.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => return reply(OpResult::fail("malformed payload: missing id")),
            },
            _ => return reply(OpResult::fail("malformed payload: expected an id")),
        };
        let res = match op {
            "launch" => self.manager.launch_plugin(&id).await,
            "close" => self.manager.close_plugin(&id).await,
            "enable" => self.manager.enable_plugin(&id).await,
            "disable" => self.manager.disable_plugin(&id).await,
            "uninstall" => self.manager.uninstall_plugin(&id).await,
            _ => OpResult::fail(format!("unknown command: plugin:{op}")),
        };
        reply(res)
    }

    /// Scan `root`, register what is running, and watch it for new projects.
    pub async fn start_workspace(&self, root: &Path) -> Result<Vec<String>> {
        let registered = self.scanner.scan_and_register_projects(root).await?;
        self.scanner.watch_root(root).await?;
        Ok(registered)
    }

    pub async fn shutdown(&self) {
        self.scanner.cleanup().await;
        self.loader.cleanup().await;
        self.webview.cleanup().await;
        self.manager.cleanup().await;
        info!("Plugin host stopped");
    }
}

fn reply(res: OpResult) -> Value {
    json!({ "success": res.success, "message": res.message })
}
