//! Installed plugin management.
//!
//! Installed plugins are packages copied into the plugins directory. The
//! manager installs and removes them, tracks their enabled state through the
//! plugin store, and runs each in an isolated context constrained to the
//! permissions its manifest declares.

use std::path::Path;
use std::sync::Arc;

use plughost_core::{
    ContentSource, ContextRepository, ContextSpec, Installer, MessageBridge, OpResult, PluginError,
    PluginRecord, PluginResult, PluginStore, SandboxService,
};
use plughost_logging::{PluginEvent, PluginEventLogger};
use serde_json::Value;
use tracing::{info, warn};

use crate::lifecycle;
use crate::manifest::load_manifest;

#[derive(Clone)]
pub struct PluginManager {
    store: Arc<dyn PluginStore>,
    installer: Arc<dyn Installer>,
    sandbox: Arc<dyn SandboxService>,
    bridge: Arc<dyn MessageBridge>,
    running: ContextRepository,
}

impl PluginManager {
    pub fn new(
        store: Arc<dyn PluginStore>,
        installer: Arc<dyn Installer>,
        sandbox: Arc<dyn SandboxService>,
        bridge: Arc<dyn MessageBridge>,
    ) -> Self {
        Self::with_running(store, installer, sandbox, bridge, ContextRepository::new())
    }

    pub fn with_running(
        store: Arc<dyn PluginStore>,
        installer: Arc<dyn Installer>,
        sandbox: Arc<dyn SandboxService>,
        bridge: Arc<dyn MessageBridge>,
        running: ContextRepository,
    ) -> Self {
        Self { store, installer, sandbox, bridge, running }
    }

    pub async fn install_plugin(&self, source: &Path) -> OpResult {
        let result: PluginResult<PluginRecord> = async {
            let record = self.installer.install(source).await?;
            self.store.save_record(record.clone()).await?;
            Ok::<_, PluginError>(record)
        }
        .await;
        match result {
            Ok(record) => {
                PluginEventLogger::log_event(
                    &record.id,
                    PluginEvent::Registered { source: record.install_path.display().to_string() },
                );
                OpResult::ok(format!("plugin {} {} installed", record.id, record.version))
            }
            Err(e) => fail(&source.display().to_string(), e),
        }
    }

    /// Close, remove from disk and forget.
    pub async fn uninstall_plugin(&self, id: &str) -> OpResult {
        let result: PluginResult<()> = async {
            self.require_record(id).await?;
            lifecycle::close_tracked(&self.running, &self.bridge, id).await;
            self.installer.uninstall(id).await?;
            self.store.remove_record(id).await?;
            Ok::<_, PluginError>(())
        }
        .await;
        match result {
            Ok(()) => {
                info!(plugin = %id, "Plugin uninstalled");
                OpResult::ok(format!("plugin {id} uninstalled"))
            }
            Err(e) => fail(id, e),
        }
    }

    pub async fn enable_plugin(&self, id: &str) -> OpResult {
        match self.set_enabled(id, true).await {
            Ok(()) => OpResult::ok(format!("plugin {id} enabled")),
            Err(e) => fail(id, e),
        }
    }

    /// Disable the plugin and close it if open.
    pub async fn disable_plugin(&self, id: &str) -> OpResult {
        match self.set_enabled(id, false).await {
            Ok(()) => {
                lifecycle::close_tracked(&self.running, &self.bridge, id).await;
                OpResult::ok(format!("plugin {id} disabled"))
            }
            Err(e) => fail(id, e),
        }
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> PluginResult<()> {
        if !self.store.set_enabled(id, enabled).await? {
            return Err(PluginError::NotFound(id.into()));
        }
        info!(plugin = %id, enabled, "Plugin state changed");
        Ok(())
    }

    pub async fn launch_plugin(&self, id: &str) -> OpResult {
        match self.try_launch(id).await {
            Ok(message) => OpResult::ok(message),
            Err(e) => {
                PluginEventLogger::log_event(id, PluginEvent::Failed { error: e.to_string() });
                fail(id, e)
            }
        }
    }

    async fn try_launch(&self, id: &str) -> PluginResult<String> {
        let record = self.require_record(id).await?;
        if !record.enabled {
            return Err(PluginError::Disabled(id.into()));
        }
        if let Some(view) = self.running.live(id).await {
            view.focus();
            return Ok(format!("plugin {id} focused"));
        }

        let manifest = load_manifest(&record.install_path).await?;
        let view = self
            .sandbox
            .create_isolated_context(ContextSpec::for_manifest(&manifest))
            .await
            .map_err(|e| PluginError::Sandbox(e.to_string()))?;
        lifecycle::track_context(&self.running, &self.bridge, id, &view).await;

        let entry = ContentSource::File(record.install_path.join(&manifest.entry_file));
        if let Err(e) = view.load(&entry).await {
            lifecycle::discard_context(&self.running, &self.bridge, id, &view).await;
            return Err(e.into());
        }
        info!(plugin = %id, entry = %entry, "Plugin launched");
        PluginEventLogger::log_event(id, PluginEvent::Launched { source: entry.to_string() });
        Ok(format!("plugin {id} launched"))
    }

    pub async fn close_plugin(&self, id: &str) -> OpResult {
        if lifecycle::close_tracked(&self.running, &self.bridge, id).await {
            info!(plugin = %id, "Plugin closed");
            OpResult::ok(format!("plugin {id} closed"))
        } else {
            PluginError::NotRunning(id.into()).into()
        }
    }

    /// Deliver a payload to an open plugin.
    pub async fn send_message_to_plugin(&self, id: &str, channel: &str, payload: Value) -> OpResult {
        let Some(view) = self.running.live(id).await else {
            return PluginError::ContextUnavailable(id.into()).into();
        };
        match view.post_message(channel, payload) {
            Ok(()) => OpResult::ok(format!("message sent to plugin {id}")),
            Err(e) => fail(id, e.into()),
        }
    }

    pub async fn list_plugins(&self) -> Vec<PluginRecord> {
        match self.store.list_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Cannot list installed plugins");
                Vec::new()
            }
        }
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.running.live(id).await.is_some()
    }

    pub async fn cleanup(&self) {
        let closed = lifecycle::close_all(&self.running, &self.bridge).await;
        info!(closed, "Plugin manager cleaned up");
    }

    async fn require_record(&self, id: &str) -> PluginResult<PluginRecord> {
        self.store
            .get_plugin_record(id)
            .await?
            .ok_or_else(|| PluginError::NotFound(id.into()))
    }
}

fn fail(subject: &str, err: PluginError) -> OpResult {
    warn!(plugin = %subject, error = %err, "Plugin operation failed");
    err.into()
}
