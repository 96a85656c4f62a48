//! File-backed ("dev-mode") plugins.
//!
//! A dev plugin is a source directory on disk. Launching one opens an
//! isolated context and feeds it the plugin's dev server if one answers on
//! the plugin's derived port, else the manifest entry file from disk. In
//! development mode the source tree is watched and bursts of changes are
//! coalesced into a single reload of the open context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use plughost_core::{
    ConfigRepository, ContentSource, ContextRepository, ContextSpec, DevPluginConfig,
    MessageBridge, OpResult, PluginError, PluginResult, Repository, SandboxService, SandboxedView,
};
use plughost_logging::{PluginEvent, PluginEventLogger};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::lifecycle;
use crate::watcher::{ChangeCallback, ChangeFilter, SourceWatch};

/// Plugin whose dev server port is pinned rather than derived.
const PINNED_PORT_PLUGIN: &str = "hello-world";
const PINNED_PORT: u16 = 3001;

/// Tunables for [`PluginDevLoader`].
#[derive(Debug, Clone)]
pub struct DevLoaderSettings {
    /// Watch sources and open contexts with dev tools.
    pub development_mode: bool,
    pub debounce: Duration,
    /// Host the dev server is expected on.
    pub dev_host: String,
    pub dev_port_base: u16,
    pub dev_port_span: u16,
    pub watch_extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
}

impl Default for DevLoaderSettings {
    fn default() -> Self {
        Self {
            development_mode: true,
            debounce: Duration::from_millis(300),
            dev_host: "localhost".into(),
            dev_port_base: 3000,
            dev_port_span: 1000,
            watch_extensions: ["js", "jsx", "ts", "tsx", "vue", "svelte", "html", "css", "scss", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignored_dirs: ["node_modules", ".git", "dist"].into_iter().map(String::from).collect(),
        }
    }
}

/// The registries a loader works against.
#[derive(Clone, Default)]
pub struct DevLoaderStores {
    pub configs: ConfigRepository<DevPluginConfig>,
    pub running: ContextRepository,
    pub watchers: Repository<SourceWatch>,
}

/// Listing entry for a registered dev plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevPluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub source_path: PathBuf,
    pub running: bool,
}

/// Stable port for a plugin's dev server, derived from its id.
///
/// Java-style 31-multiplier hash over UTF-16 units, mapped into
/// `[base, base + span)`.
pub fn dev_server_port(plugin_id: &str, base: u16, span: u16) -> u16 {
    if plugin_id == PINNED_PORT_PLUGIN {
        return PINNED_PORT;
    }
    let hash = plugin_id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let offset = hash.unsigned_abs() % u32::from(span.max(1));
    base.saturating_add(offset as u16)
}

#[derive(Clone)]
pub struct PluginDevLoader {
    configs: ConfigRepository<DevPluginConfig>,
    running: ContextRepository,
    watchers: Repository<SourceWatch>,
    sandbox: Arc<dyn SandboxService>,
    bridge: Arc<dyn MessageBridge>,
    settings: Arc<DevLoaderSettings>,
}

impl PluginDevLoader {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        bridge: Arc<dyn MessageBridge>,
        settings: DevLoaderSettings,
    ) -> Self {
        Self::with_stores(DevLoaderStores::default(), sandbox, bridge, settings)
    }

    pub fn with_stores(
        stores: DevLoaderStores,
        sandbox: Arc<dyn SandboxService>,
        bridge: Arc<dyn MessageBridge>,
        settings: DevLoaderSettings,
    ) -> Self {
        Self {
            configs: stores.configs,
            running: stores.running,
            watchers: stores.watchers,
            sandbox,
            bridge,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &DevLoaderSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a dev plugin, watching its sources in development mode.
    pub async fn register_dev_plugin(&self, config: DevPluginConfig) -> OpResult {
        let watch = self.settings.development_mode;
        self.register_dev_plugin_with(config, watch).await
    }

    /// Register a dev plugin; `watch` decides whether the loader watches its
    /// sources. Callers that run their own watch pass `false`.
    pub async fn register_dev_plugin_with(&self, config: DevPluginConfig, watch: bool) -> OpResult {
        let id = config.id.clone();
        match self.try_register(config, watch).await {
            Ok(()) => OpResult::ok(format!("dev plugin {id} registered")),
            Err(e) => {
                warn!(plugin = %id, error = %e, "Dev plugin registration failed");
                e.into()
            }
        }
    }

    async fn try_register(&self, config: DevPluginConfig, watch: bool) -> PluginResult<()> {
        if config.id.trim().is_empty() {
            return Err(PluginError::InvalidConfig("plugin id is empty".into()));
        }
        if !tokio::fs::try_exists(&config.source_path).await.unwrap_or(false) {
            return Err(PluginError::SourceMissing(config.source_path));
        }

        let id = config.id.clone();
        let source = config.source_path.clone();
        self.configs.insert(id.clone(), config).await;
        if watch {
            self.watch_sources(&id, &source).await;
        }

        info!(plugin = %id, source = %source.display(), watch, "Dev plugin registered");
        PluginEventLogger::log_event(&id, PluginEvent::Registered { source: source.display().to_string() });
        Ok(())
    }

    /// Start the debounced source watch for `id` unless one already exists.
    async fn watch_sources(&self, id: &str, root: &Path) {
        let loader = self.clone();
        let plugin_id = id.to_string();
        let on_change: ChangeCallback = Arc::new(move || {
            let loader = loader.clone();
            let plugin_id = plugin_id.clone();
            Box::pin(async move { loader.reload_on_change(&plugin_id).await })
        });
        let filter = ChangeFilter::new(&self.settings.watch_extensions).ignoring(&self.settings.ignored_dirs);
        let debounce = self.settings.debounce;

        match self
            .watchers
            .insert_with(id, || SourceWatch::start(root, filter, debounce, on_change))
            .await
        {
            Ok(true) => debug!(plugin = %id, "Source watch started"),
            Ok(false) => debug!(plugin = %id, "Source watch already active"),
            Err(e) => warn!(plugin = %id, error = %e, "Cannot watch plugin sources; hot reload disabled"),
        }
    }

    /// Close, unwatch and forget a dev plugin.
    pub async fn unregister_dev_plugin(&self, id: &str) -> OpResult {
        if self.configs.remove(id).await.is_none() {
            return PluginError::NotFound(id.into()).into();
        }
        if let Some(watch) = self.watchers.remove(id).await {
            watch.close();
        }
        lifecycle::close_tracked(&self.running, &self.bridge, id).await;
        info!(plugin = %id, "Dev plugin unregistered");
        OpResult::ok(format!("dev plugin {id} unregistered"))
    }

    // -----------------------------------------------------------------------
    // Launch / load
    // -----------------------------------------------------------------------

    /// Open the plugin, or focus it if it is already open.
    pub async fn launch_dev_plugin(&self, id: &str) -> OpResult {
        match self.try_launch(id).await {
            Ok(message) => OpResult::ok(message),
            Err(e) => {
                warn!(plugin = %id, error = %e, "Dev plugin launch failed");
                PluginEventLogger::log_event(id, PluginEvent::Failed { error: e.to_string() });
                e.into()
            }
        }
    }

    async fn try_launch(&self, id: &str) -> PluginResult<String> {
        let config = self
            .configs
            .get(id)
            .await
            .ok_or_else(|| PluginError::NotFound(id.into()))?;

        if let Some(view) = self.running.live(id).await {
            view.focus();
            debug!(plugin = %id, "Dev plugin already open; focused");
            return Ok(format!("dev plugin {id} focused"));
        }

        let spec = ContextSpec::restrictive(&config.id, &config.name)
            .with_dev_tools(config.dev_tools.unwrap_or(self.settings.development_mode));
        let view = self
            .sandbox
            .create_isolated_context(spec)
            .await
            .map_err(|e| PluginError::Sandbox(e.to_string()))?;

        lifecycle::track_context(&self.running, &self.bridge, id, &view).await;

        match self.load_dev_plugin(view.as_ref(), &config).await {
            Ok(source) => {
                info!(plugin = %id, source = %source, "Dev plugin launched");
                PluginEventLogger::log_event(id, PluginEvent::Launched { source: source.to_string() });
                Ok(format!("dev plugin {id} launched from {source}"))
            }
            Err(e) => {
                lifecycle::discard_context(&self.running, &self.bridge, id, &view).await;
                Err(e)
            }
        }
    }

    /// Feed content into `view`: the dev server if it answers, else the
    /// entry file from disk.
    pub async fn load_dev_plugin(
        &self,
        view: &dyn SandboxedView,
        config: &DevPluginConfig,
    ) -> PluginResult<ContentSource> {
        // Reloads are not fenced against close, so a queued reload can land
        // on a context that has since gone away.
        if view.is_destroyed() {
            return Err(PluginError::ContextDestroyed(config.id.clone()));
        }

        let port = dev_server_port(&config.id, self.settings.dev_port_base, self.settings.dev_port_span);
        let url = ContentSource::Url(format!("http://{}:{port}", self.settings.dev_host));
        match view.load(&url).await {
            Ok(()) => return Ok(url),
            Err(e) => {
                debug!(plugin = %config.id, url = %url, error = %e, "Dev server unavailable");
                PluginEventLogger::log_event(
                    &config.id,
                    PluginEvent::FallbackToDisk { reason: e.to_string() },
                );
            }
        }

        let entry = config.source_path.join(&config.manifest.entry_file);
        if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            return Err(PluginError::NoContentSource(config.id.clone()));
        }
        let file = ContentSource::File(entry);
        if let Err(e) = view.load(&file).await {
            warn!(plugin = %config.id, file = %file, error = %e, "Entry file failed to load");
            return Err(PluginError::NoContentSource(config.id.clone()));
        }
        Ok(file)
    }

    // -----------------------------------------------------------------------
    // Close / reload
    // -----------------------------------------------------------------------

    pub async fn close_dev_plugin(&self, id: &str) -> OpResult {
        if !lifecycle::close_tracked(&self.running, &self.bridge, id).await {
            return PluginError::NotRunning(id.into()).into();
        }
        info!(plugin = %id, "Dev plugin closed");
        OpResult::ok(format!("dev plugin {id} closed"))
    }

    /// Re-resolve and reload content into the open context.
    pub async fn reload_dev_plugin(&self, id: &str) -> OpResult {
        match self.try_reload(id).await {
            Ok(source) => OpResult::ok(format!("dev plugin {id} reloaded from {source}")),
            Err(e) => {
                warn!(plugin = %id, error = %e, "Dev plugin reload failed");
                e.into()
            }
        }
    }

    async fn try_reload(&self, id: &str) -> PluginResult<ContentSource> {
        let config = self
            .configs
            .get(id)
            .await
            .ok_or_else(|| PluginError::NotFound(id.into()))?;
        let view = self
            .running
            .live(id)
            .await
            .ok_or_else(|| PluginError::NotRunning(id.into()))?;
        let source = self.load_dev_plugin(view.as_ref(), &config).await?;
        info!(plugin = %id, source = %source, "Dev plugin reloaded");
        PluginEventLogger::log_event(id, PluginEvent::Reloaded { source: source.to_string() });
        Ok(source)
    }

    /// Debounced change handler. A closed plugin has nothing to reload.
    pub async fn reload_on_change(&self, id: &str) {
        if self.running.live(id).await.is_none() {
            debug!(plugin = %id, "Source changed but plugin is not open");
            return;
        }
        self.reload_dev_plugin(id).await;
    }

    /// Inject a changed path into the plugin's source watch.
    pub async fn notify_change(&self, id: &str, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.watchers.with(id, |watch| watch.notify(path)).await.unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn list_dev_plugins(&self) -> Vec<DevPluginSummary> {
        let configs = self.configs.values().await;
        let mut out = Vec::with_capacity(configs.len());
        for config in configs {
            let running = self.running.live(&config.id).await.is_some();
            out.push(DevPluginSummary {
                id: config.id,
                name: config.name,
                version: config.version,
                source_path: config.source_path,
                running,
            });
        }
        out
    }

    pub async fn config(&self, id: &str) -> Option<DevPluginConfig> {
        self.configs.get(id).await
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.running.live(id).await.is_some()
    }

    /// Close every watch and context, then forget every plugin.
    pub async fn cleanup(&self) {
        for (id, watch) in self.watchers.drain().await {
            debug!(plugin = %id, "Stopping source watch");
            watch.close();
        }
        let closed = lifecycle::close_all(&self.running, &self.bridge).await;
        self.configs.clear().await;
        info!(closed, "Dev loader cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_core::headless::{HeadlessSandbox, InMemoryBridge, LoadPolicy};
    use plughost_core::Manifest;
    use tempfile::TempDir;

    struct Harness {
        loader: PluginDevLoader,
        stores: DevLoaderStores,
        sandbox: Arc<HeadlessSandbox>,
        bridge: Arc<InMemoryBridge>,
        dir: TempDir,
    }

    fn harness(policy: LoadPolicy) -> Harness {
        let sandbox = Arc::new(HeadlessSandbox::with_policy(policy));
        let bridge = Arc::new(InMemoryBridge::new());
        let stores = DevLoaderStores::default();
        let loader = PluginDevLoader::with_stores(
            stores.clone(),
            sandbox.clone(),
            bridge.clone(),
            DevLoaderSettings::default(),
        );
        Harness { loader, stores, sandbox, bridge, dir: tempfile::tempdir().unwrap() }
    }

    impl Harness {
        /// Source dir for `id`, with `index.html` when `with_entry`.
        fn config(&self, id: &str, with_entry: bool) -> DevPluginConfig {
            let source = self.dir.path().join(id);
            std::fs::create_dir_all(&source).unwrap();
            if with_entry {
                std::fs::write(source.join("index.html"), "<html></html>").unwrap();
            }
            DevPluginConfig {
                id: id.into(),
                name: id.to_uppercase(),
                version: "0.1.0".into(),
                source_path: source,
                dev_tools: None,
                manifest: Manifest {
                    id: id.into(),
                    name: id.to_uppercase(),
                    version: "0.1.0".into(),
                    description: String::new(),
                    author: String::new(),
                    entry_file: "index.html".into(),
                    permissions: Default::default(),
                },
            }
        }
    }

    #[test]
    fn dev_port_is_stable_and_in_range() {
        assert_eq!(dev_server_port("alpha", 3000, 1000), 3918);
        assert_eq!(dev_server_port("hello-world", 3000, 1000), 3001);
        for id in ["a", "notes", "a-very-long-plugin-identifier"] {
            let port = dev_server_port(id, 3000, 1000);
            assert!((3000..4000).contains(&port));
            assert_eq!(port, dev_server_port(id, 3000, 1000));
        }
    }

    #[tokio::test]
    async fn registering_twice_keeps_one_config_and_one_watch() {
        let h = harness(LoadPolicy::AcceptAll);
        let config = h.config("alpha", true);

        assert!(h.loader.register_dev_plugin(config.clone()).await.success);
        assert!(h.loader.register_dev_plugin(config).await.success);

        assert_eq!(h.stores.configs.len().await, 1);
        assert_eq!(h.stores.watchers.len().await, 1);
    }

    #[tokio::test]
    async fn registration_without_watch_skips_watcher() {
        let h = harness(LoadPolicy::AcceptAll);
        let res = h.loader.register_dev_plugin_with(h.config("alpha", true), false).await;
        assert!(res.success);
        assert!(h.stores.watchers.is_empty().await);
        assert!(!h.loader.notify_change("alpha", "/x/a.ts").await);
    }

    #[tokio::test]
    async fn missing_source_is_rejected() {
        let h = harness(LoadPolicy::AcceptAll);
        let mut config = h.config("alpha", true);
        config.source_path = h.dir.path().join("gone");

        let res = h.loader.register_dev_plugin(config).await;
        assert!(!res.success);
        assert!(res.message.starts_with("source path does not exist"));
        assert!(h.stores.configs.is_empty().await);
    }

    #[tokio::test]
    async fn launch_falls_back_to_entry_file() {
        let h = harness(LoadPolicy::RejectUrls);
        let config = h.config("alpha", true);
        let entry = config.source_path.join("index.html");
        h.loader.register_dev_plugin_with(config, false).await;

        let res = h.loader.launch_dev_plugin("alpha").await;
        assert!(res.success, "{}", res.message);

        let session = &h.sandbox.sessions_for("alpha")[0];
        assert_eq!(
            session.loads(),
            vec![
                ContentSource::Url("http://localhost:3918".into()),
                ContentSource::File(entry),
            ]
        );
        assert!(session.spec().arguments.contains(&"--plugin-id=alpha".to_string()));
        assert!(!session.spec().profile.privileged_api);
        assert!(h.bridge.is_registered("alpha"));
        assert!(h.loader.is_running("alpha").await);
    }

    #[tokio::test]
    async fn launch_without_any_source_fails_and_cleans_up() {
        let h = harness(LoadPolicy::RejectUrls);
        h.loader.register_dev_plugin_with(h.config("alpha", false), false).await;

        let res = h.loader.launch_dev_plugin("alpha").await;
        assert!(!res.success);
        assert_eq!(res.message, "no content source available for plugin alpha");
        assert!(h.stores.running.is_empty().await);
        assert!(!h.bridge.is_registered("alpha"));
        assert!(h.sandbox.sessions_for("alpha")[0].is_destroyed());
    }

    #[tokio::test]
    async fn entry_file_that_fails_to_load_means_no_content_source() {
        let h = harness(LoadPolicy::RejectAll);
        h.loader.register_dev_plugin_with(h.config("alpha", true), false).await;

        let res = h.loader.launch_dev_plugin("alpha").await;
        assert!(!res.success);
        assert_eq!(res.message, "no content source available for plugin alpha");

        let session = &h.sandbox.sessions_for("alpha")[0];
        assert_eq!(session.loads().len(), 2);
        assert!(session.is_destroyed());
        assert!(h.stores.running.is_empty().await);
    }

    #[tokio::test]
    async fn dev_tools_follow_config_over_settings() {
        let h = harness(LoadPolicy::AcceptAll);
        let mut config = h.config("alpha", true);
        config.dev_tools = Some(false);
        h.loader.register_dev_plugin_with(config, false).await;
        h.loader.register_dev_plugin_with(h.config("beta", true), false).await;

        h.loader.launch_dev_plugin("alpha").await;
        h.loader.launch_dev_plugin("beta").await;

        assert!(!h.sandbox.sessions_for("alpha")[0].spec().profile.dev_tools);
        assert!(h.sandbox.sessions_for("beta")[0].spec().profile.dev_tools);
    }

    #[tokio::test]
    async fn second_launch_focuses_existing_context() {
        let h = harness(LoadPolicy::AcceptAll);
        h.loader.register_dev_plugin_with(h.config("alpha", true), false).await;

        assert!(h.loader.launch_dev_plugin("alpha").await.success);
        assert!(h.loader.launch_dev_plugin("alpha").await.success);

        let sessions = h.sandbox.sessions_for("alpha");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].focus_count(), 1);
    }

    #[tokio::test]
    async fn launching_unknown_plugin_fails() {
        let h = harness(LoadPolicy::AcceptAll);
        let res = h.loader.launch_dev_plugin("ghost").await;
        assert!(!res.success);
        assert_eq!(res.message, "plugin ghost not found");
    }

    #[tokio::test(start_paused = true)]
    async fn change_bursts_coalesce_into_single_reload() {
        let h = harness(LoadPolicy::AcceptAll);
        let config = h.config("alpha", true);
        let src = config.source_path.clone();
        h.loader.register_dev_plugin(config).await;
        h.loader.launch_dev_plugin("alpha").await;
        let session = Arc::clone(&h.sandbox.sessions_for("alpha")[0]);
        assert_eq!(session.loads().len(), 1);

        for name in ["a.ts", "b.tsx", "c.css", "d.ts"] {
            assert!(h.loader.notify_change("alpha", src.join(name)).await);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        h.loader.notify_change("alpha", src.join("README.md")).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(session.loads().len(), 2);

        h.loader.notify_change("alpha", src.join("e.ts")).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(session.loads().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn changes_after_close_do_not_reload() {
        let h = harness(LoadPolicy::AcceptAll);
        let config = h.config("alpha", true);
        let src = config.source_path.clone();
        h.loader.register_dev_plugin(config).await;
        h.loader.launch_dev_plugin("alpha").await;

        assert!(h.loader.close_dev_plugin("alpha").await.success);
        h.loader.notify_change("alpha", src.join("a.ts")).await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(h.sandbox.sessions_for("alpha")[0].loads().len(), 1);
        let res = h.loader.reload_dev_plugin("alpha").await;
        assert_eq!(res.message, "plugin alpha is not running");
    }

    #[tokio::test]
    async fn context_close_event_removes_entry() {
        let h = harness(LoadPolicy::AcceptAll);
        h.loader.register_dev_plugin_with(h.config("alpha", true), false).await;
        h.loader.launch_dev_plugin("alpha").await;

        h.sandbox.sessions_for("alpha")[0].close();
        for _ in 0..100 {
            if !h.stores.running.contains("alpha").await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!h.stores.running.contains("alpha").await);
        assert!(!h.bridge.is_registered("alpha"));
        assert!(h.stores.configs.contains("alpha").await);
    }

    #[tokio::test]
    async fn cleanup_closes_everything_once() {
        let h = harness(LoadPolicy::AcceptAll);
        for id in ["alpha", "beta"] {
            h.loader.register_dev_plugin(h.config(id, true)).await;
            h.loader.launch_dev_plugin(id).await;
        }
        assert_eq!(h.stores.watchers.len().await, 2);

        h.loader.cleanup().await;

        assert!(h.stores.configs.is_empty().await);
        assert!(h.stores.running.is_empty().await);
        assert!(h.stores.watchers.is_empty().await);
        assert!(h.bridge.registered_ids().is_empty());
        assert_eq!(h.bridge.unregistration_count(), 2);
        for session in h.sandbox.sessions() {
            assert_eq!(session.close_count(), 1);
        }
    }

    #[tokio::test]
    async fn list_and_unregister() {
        let h = harness(LoadPolicy::AcceptAll);
        h.loader.register_dev_plugin_with(h.config("beta", true), false).await;
        h.loader.register_dev_plugin_with(h.config("alpha", true), false).await;
        h.loader.launch_dev_plugin("beta").await;

        let listed = h.loader.list_dev_plugins().await;
        assert_eq!(listed.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["alpha", "beta"]);
        assert!(!listed[0].running);
        assert!(listed[1].running);

        assert!(h.loader.unregister_dev_plugin("beta").await.success);
        assert!(h.sandbox.sessions_for("beta")[0].is_destroyed());
        assert!(!h.loader.unregister_dev_plugin("beta").await.success);
        assert_eq!(h.loader.list_dev_plugins().await.len(), 1);
    }
}
