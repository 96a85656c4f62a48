use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ContentSource, ContextSpec, PluginRecord};

/// Callback fired once when a context is closed.
pub type ClosedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to an isolated execution context rendering one plugin.
///
/// Backed by a native embedded view, a subprocess with its own render
/// surface, or a logical session in headless mode.
#[async_trait]
pub trait SandboxedView: Send + Sync {
    /// Plugin id this context was created for.
    fn plugin_id(&self) -> &str;

    /// Load content into the context, replacing whatever is showing.
    async fn load(&self, source: &ContentSource) -> Result<()>;

    fn focus(&self);

    /// Close the context. Closing twice is a no-op.
    fn close(&self);

    fn is_destroyed(&self) -> bool;

    /// Register a callback for the close event. Runs immediately if the
    /// context is already destroyed.
    fn on_closed(&self, callback: ClosedCallback);

    /// Deliver an arbitrary payload to the plugin.
    fn post_message(&self, channel: &str, payload: serde_json::Value) -> Result<()>;
}

/// Creates isolated execution contexts.
#[async_trait]
pub trait SandboxService: Send + Sync {
    async fn create_isolated_context(&self, spec: ContextSpec) -> Result<Arc<dyn SandboxedView>>;
}

/// Routes inter-context messages to registered plugin contexts.
pub trait MessageBridge: Send + Sync {
    fn register_context(&self, plugin_id: &str, view: Arc<dyn SandboxedView>);
    fn unregister_context(&self, plugin_id: &str);
}

/// Persisted settings for installed plugins.
#[async_trait]
pub trait PluginStore: Send + Sync {
    async fn get_plugin_record(&self, id: &str) -> Result<Option<PluginRecord>>;
    /// Returns `false` if no record exists for `id`.
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool>;
    async fn save_record(&self, record: PluginRecord) -> Result<()>;
    async fn remove_record(&self, id: &str) -> Result<bool>;
    async fn list_records(&self) -> Result<Vec<PluginRecord>>;
}

/// Installs and removes plugin packages on disk.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, source: &Path) -> Result<PluginRecord>;
    async fn uninstall(&self, id: &str) -> Result<()>;
}

/// A top-level host window that can receive directives.
pub trait HostWindow: Send + Sync {
    /// Address currently loaded in the window.
    fn current_url(&self) -> String;
    fn send(&self, channel: &str, payload: serde_json::Value) -> Result<()>;
}

/// Enumerates the host's open windows.
pub trait WindowDirectory: Send + Sync {
    fn windows(&self) -> Vec<Arc<dyn HostWindow>>;
}
