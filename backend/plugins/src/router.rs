//! In-memory request/response bus for loader and webview commands.
//!
//! Commands are addressed by name (`dev-plugin:launch`, ...) and carry a JSON
//! payload. Replies are JSON: `{success, message}`, or an array for the
//! list commands. The bus is transport independent; whatever carries
//! messages between the UI and the host hands them to [`CommandRouter::dispatch`].

use std::fmt;

use plughost_core::{DevPluginConfig, OpResult, PluginError, PluginResult, WebviewPluginConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::dev_loader::PluginDevLoader;
use crate::webview::PluginWebviewManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DevRegister,
    DevLaunch,
    DevClose,
    DevList,
    DevReload,
    WebviewRegister,
    WebviewLaunch,
    WebviewClose,
    WebviewList,
    WebviewInjectApi,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::DevRegister,
        Command::DevLaunch,
        Command::DevClose,
        Command::DevList,
        Command::DevReload,
        Command::WebviewRegister,
        Command::WebviewLaunch,
        Command::WebviewClose,
        Command::WebviewList,
        Command::WebviewInjectApi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::DevRegister => "dev-plugin:register",
            Command::DevLaunch => "dev-plugin:launch",
            Command::DevClose => "dev-plugin:close",
            Command::DevList => "dev-plugin:list",
            Command::DevReload => "dev-plugin:reload",
            Command::WebviewRegister => "webview-plugin:register",
            Command::WebviewLaunch => "webview-plugin:launch",
            Command::WebviewClose => "webview-plugin:close",
            Command::WebviewList => "webview-plugin:list",
            Command::WebviewInjectApi => "webview-plugin:inject-api",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin id, given bare or as `{ "id": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdPayload {
    Bare(String),
    Object { id: String },
}

#[derive(Clone)]
pub struct CommandRouter {
    dev: PluginDevLoader,
    webview: PluginWebviewManager,
}

impl CommandRouter {
    pub fn new(dev: PluginDevLoader, webview: PluginWebviewManager) -> Self {
        Self { dev, webview }
    }

    /// Run `command` and return its JSON reply. Never fails; errors become
    /// `{success: false, message}`.
    pub async fn dispatch(&self, command: &str, payload: Value) -> Value {
        let Some(cmd) = Command::parse(command) else {
            return reply(OpResult::fail(format!("unknown command: {command}")));
        };
        debug!(command = %cmd, "Dispatching command");
        match self.route(cmd, payload).await {
            Ok(value) => value,
            Err(e) => reply(e.into()),
        }
    }

    async fn route(&self, cmd: Command, payload: Value) -> PluginResult<Value> {
        let value = match cmd {
            Command::DevRegister => {
                let config: DevPluginConfig = parse(payload)?;
                reply(self.dev.register_dev_plugin(config).await)
            }
            Command::DevLaunch => reply(self.dev.launch_dev_plugin(&plugin_id(payload)?).await),
            Command::DevClose => reply(self.dev.close_dev_plugin(&plugin_id(payload)?).await),
            Command::DevReload => reply(self.dev.reload_dev_plugin(&plugin_id(payload)?).await),
            Command::DevList => to_json(self.dev.list_dev_plugins().await)?,
            Command::WebviewRegister => {
                let config: WebviewPluginConfig = parse(payload)?;
                reply(self.webview.register_webview_plugin(config).await)
            }
            Command::WebviewLaunch => reply(self.webview.launch_webview_plugin(&plugin_id(payload)?).await),
            Command::WebviewClose => reply(self.webview.close_webview_plugin(&plugin_id(payload)?).await),
            Command::WebviewInjectApi => reply(self.webview.inject_plugin_api(&plugin_id(payload)?).await),
            Command::WebviewList => to_json(self.webview.list_webview_plugins().await)?,
        };
        Ok(value)
    }
}

fn reply(res: OpResult) -> Value {
    json!({ "success": res.success, "message": res.message })
}

fn parse<T: DeserializeOwned>(payload: Value) -> PluginResult<T> {
    serde_json::from_value(payload).map_err(|e| PluginError::InvalidConfig(format!("malformed payload: {e}")))
}

fn plugin_id(payload: Value) -> PluginResult<String> {
    match parse::<IdPayload>(payload)? {
        IdPayload::Bare(id) | IdPayload::Object { id } => Ok(id),
    }
}

fn to_json<T: Serialize>(value: T) -> PluginResult<Value> {
    serde_json::to_value(value).map_err(|e| PluginError::Other(e.into()))
}
