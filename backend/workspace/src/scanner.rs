//! Workspace auto-discovery.
//!
//! Each immediate subdirectory of a workspace root is a candidate project.
//! A project is registered when its descriptor names a dev script, a port
//! can be guessed from that script, and a server is actually listening on or
//! just above the guessed port. Registered projects are hot-reloaded from
//! their own debounced source watch, and a watch on the root picks up new
//! projects as they appear.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use plughost_core::{
    ConfigRepository, DevPluginConfig, Manifest, Repository, WebviewPluginConfig,
    BASELINE_PERMISSIONS,
};
use plughost_logging::{redact_sensitive_data, PluginEvent, PluginEventLogger};
use plughost_plugins::{
    ChangeCallback, ChangeFilter, CreatedCallback, DirectoryWatch, PluginDevLoader,
    PluginWebviewManager, SourceWatch,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::descriptor::{read_descriptor, ProjectDescriptor};
use crate::ports::{extract_port, find_running_port, PortProbe};

/// Entry file given to every discovered project's manifest.
pub const PROJECT_ENTRY_FILE: &str = "index.html";

const FALLBACK_VERSION: &str = "0.0.0";

/// A project found by a scan pass. Rebuilt on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    pub source_path: PathBuf,
    pub descriptor: ProjectDescriptor,
    pub has_dev_server: bool,
    pub dev_server_port: Option<u16>,
}

impl ProjectConfig {
    /// Manifest with the baseline permission set.
    pub fn manifest(&self) -> Manifest {
        Manifest {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.descriptor.description.clone().unwrap_or_default(),
            author: self
                .descriptor
                .author
                .as_ref()
                .map(|a| a.name().to_string())
                .unwrap_or_default(),
            entry_file: PROJECT_ENTRY_FILE.into(),
            permissions: BASELINE_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub descriptor_file: String,
    /// Wait after a new directory appears before scanning it.
    pub settle_delay: Duration,
    pub debounce: Duration,
    /// Ports probed above the guessed one.
    pub probe_span: u16,
    pub source_extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
    /// Host used in discovered dev server URLs.
    pub dev_host: String,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            descriptor_file: "package.json".into(),
            settle_delay: Duration::from_millis(1000),
            debounce: Duration::from_millis(300),
            probe_span: 10,
            source_extensions: ["js", "jsx", "ts", "tsx", "vue", "svelte", "html", "css", "scss", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignored_dirs: ["node_modules", ".git", "dist"].into_iter().map(String::from).collect(),
            dev_host: "localhost".into(),
        }
    }
}

#[derive(Clone)]
pub struct WorkspaceScanner {
    loader: PluginDevLoader,
    webview: PluginWebviewManager,
    probe: Arc<dyn PortProbe>,
    settings: Arc<ScannerSettings>,
    projects: ConfigRepository<ProjectConfig>,
    project_watches: Repository<SourceWatch>,
    root_watches: Repository<DirectoryWatch>,
}

impl WorkspaceScanner {
    pub fn new(
        loader: PluginDevLoader,
        webview: PluginWebviewManager,
        probe: Arc<dyn PortProbe>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            loader,
            webview,
            probe,
            settings: Arc::new(settings),
            projects: ConfigRepository::new(),
            project_watches: Repository::new(),
            root_watches: Repository::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Scan every project under `root`, one at a time, and register the
    /// runnable ones. Returns the ids registered by this pass.
    pub async fn scan_and_register_projects(&self, root: &Path) -> Result<Vec<String>> {
        let dirs = self.project_dirs(root).await?;
        let mut registered = Vec::new();
        for dir in dirs {
            if let Some(id) = self.scan_project_dir(&dir).await {
                registered.push(id);
            }
        }
        info!(root = %root.display(), registered = registered.len(), "Workspace scan complete");
        Ok(registered)
    }

    /// Inspect and register a single project directory.
    pub async fn scan_project_dir(&self, dir: &Path) -> Option<String> {
        match self.inspect_project(dir).await {
            Ok(Some(project)) => {
                let id = project.id.clone();
                self.register_project(project).await;
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping project");
                None
            }
        }
    }

    /// Work out whether `dir` is a runnable project, without registering it.
    ///
    /// `Ok(None)` means the directory is not a candidate: no descriptor, no
    /// dev script, no guessable port, or nothing listening.
    pub async fn inspect_project(&self, dir: &Path) -> Result<Option<ProjectConfig>> {
        let Some(id) = dir.file_name().and_then(|n| n.to_str()).map(String::from) else {
            return Ok(None);
        };
        let Some(descriptor) = read_descriptor(dir, &self.settings.descriptor_file).await? else {
            debug!(project = %id, "No project descriptor");
            return Ok(None);
        };
        let Some(script) = descriptor.dev_script() else {
            debug!(project = %id, "No dev or start script");
            return Ok(None);
        };
        let Some(candidate) = extract_port(script) else {
            debug!(project = %id, script = %redact_sensitive_data(script), "Cannot tell which port the dev script uses");
            return Ok(None);
        };
        let Some(port) =
            find_running_port(self.probe.as_ref(), candidate, self.settings.probe_span, &id).await
        else {
            info!(project = %id, candidate, "Dev server not running; skipping project");
            return Ok(None);
        };
        PluginEventLogger::log_event(&id, PluginEvent::Discovered { port });

        let name = non_empty_or(&descriptor.name, &id);
        let version = non_empty_or(&descriptor.version, FALLBACK_VERSION);
        Ok(Some(ProjectConfig {
            id,
            name,
            version,
            source_path: dir.to_path_buf(),
            descriptor,
            has_dev_server: true,
            dev_server_port: Some(port),
        }))
    }

    /// Register a discovered project with both loaders and start watching it.
    pub async fn register_project(&self, project: ProjectConfig) {
        let id = project.id.clone();
        let manifest = project.manifest();
        let options = project.descriptor.development_options();

        // The scanner runs the project's watch, so the loader must not.
        let dev = DevPluginConfig {
            id: id.clone(),
            name: project.name.clone(),
            version: project.version.clone(),
            source_path: project.source_path.clone(),
            dev_tools: Some(options.dev_tools),
            manifest: manifest.clone(),
        };
        let res = self.loader.register_dev_plugin_with(dev, false).await;
        if !res.success {
            warn!(project = %id, message = %res.message, "Dev loader rejected project");
        }

        if let Some(port) = project.dev_server_port {
            let webview = WebviewPluginConfig {
                id: id.clone(),
                name: project.name.clone(),
                version: project.version.clone(),
                url: format!("http://{}:{port}", self.settings.dev_host),
                is_development: true,
                manifest,
            };
            let res = self.webview.register_webview_plugin(webview).await;
            if res.success {
                let launched = self.webview.launch_webview_plugin(&id).await;
                if !launched.success {
                    warn!(project = %id, message = %launched.message, "Auto-launch failed");
                }
            } else {
                warn!(project = %id, message = %res.message, "Webview manager rejected project");
            }
        }

        let source = project.source_path.clone();
        self.projects.insert(id.clone(), project).await;
        if options.file_watcher {
            self.watch_project(&id, &source).await;
        }
        info!(project = %id, source = %source.display(), "Workspace project registered");
    }

    async fn project_dirs(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(root)
            .await
            .with_context(|| format!("read workspace root {}", root.display()))?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if self.settings.ignored_dirs.iter().any(|d| name == d.as_str()) {
                continue;
            }
            dirs.push(entry.path());
        }
        dirs.sort();
        Ok(dirs)
    }

    // -----------------------------------------------------------------------
    // Watching
    // -----------------------------------------------------------------------

    async fn watch_project(&self, id: &str, root: &Path) {
        let scanner = self.clone();
        let project_id = id.to_string();
        let on_change: ChangeCallback = Arc::new(move || {
            let scanner = scanner.clone();
            let project_id = project_id.clone();
            Box::pin(async move { scanner.reload_project(&project_id).await })
        });
        let filter = ChangeFilter::new(&self.settings.source_extensions).ignoring(&self.settings.ignored_dirs);
        let debounce = self.settings.debounce;

        match self
            .project_watches
            .insert_with(id, || SourceWatch::start(root, filter, debounce, on_change))
            .await
        {
            Ok(true) => debug!(project = %id, "Project watch started"),
            Ok(false) => debug!(project = %id, "Project watch already active"),
            Err(e) => warn!(project = %id, error = %e, "Cannot watch project; hot reload disabled"),
        }
    }

    /// Reload the project's dev entry and, if registered, its webview entry.
    /// Projects with `hotReload` off are left alone.
    pub async fn reload_project(&self, id: &str) {
        let hot_reload = self
            .projects
            .with(id, |p| p.descriptor.development_options().hot_reload)
            .await
            .unwrap_or(true);
        if !hot_reload {
            debug!(project = %id, "Project sources changed; hot reload is off");
            return;
        }
        debug!(project = %id, "Project sources changed");
        self.loader.reload_on_change(id).await;
        if self.webview.is_registered(id).await {
            let res = self.webview.reload_webview_plugin(id).await;
            if !res.success {
                warn!(project = %id, message = %res.message, "Webview reload failed");
            }
        }
    }

    /// Inject a changed path into a project's watch.
    pub async fn notify_change(&self, id: &str, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.project_watches.with(id, |w| w.notify(path)).await.unwrap_or(false)
    }

    /// Watch `root` for new project directories.
    pub async fn watch_root(&self, root: &Path) -> Result<()> {
        let handler = self.new_directory_handler();
        self.root_watches
            .insert_with(&root_key(root), || DirectoryWatch::start(root, handler))
            .await?;
        Ok(())
    }

    /// Track an already built root watch, replacing any on the same root.
    pub async fn attach_root_watch(&self, watch: DirectoryWatch) {
        let key = root_key(watch.root());
        if let Some(old) = self.root_watches.insert(key, watch).await {
            old.close();
        }
    }

    /// Callback that scans a new directory once it has settled.
    pub fn new_directory_handler(&self) -> CreatedCallback {
        let scanner = self.clone();
        Arc::new(move |dir: PathBuf| {
            let scanner = scanner.clone();
            let settle = scanner.settings.settle_delay;
            info!(dir = %dir.display(), "New project directory");
            tokio::spawn(async move {
                tokio::time::sleep(settle).await;
                scanner.scan_project_dir(&dir).await;
            });
        })
    }

    /// Report `dir` as newly created under its watched root.
    pub async fn notify_new_directory(&self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        let Some(root) = dir.parent().map(root_key) else {
            return false;
        };
        self.root_watches.with(&root, |w| w.notify(dir)).await.unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Queries / shutdown
    // -----------------------------------------------------------------------

    pub async fn projects(&self) -> Vec<ProjectConfig> {
        self.projects.values().await
    }

    /// Ids of projects with an active source watch.
    pub async fn watched_projects(&self) -> Vec<String> {
        self.project_watches.ids().await
    }

    pub async fn is_watching_root(&self, root: &Path) -> bool {
        self.root_watches.contains(&root_key(root)).await
    }

    /// Stop every watch and forget every project. Loader contexts are left
    /// to the loaders' own cleanup.
    pub async fn cleanup(&self) {
        for (root, watch) in self.root_watches.drain().await {
            debug!(root = %root, "Stopping root watch");
            watch.close();
        }
        for (_, watch) in self.project_watches.drain().await {
            watch.close();
        }
        self.projects.clear().await;
        info!("Workspace scanner cleaned up");
    }
}

fn root_key(root: &Path) -> String {
    root.display().to_string()
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::tests::FakeProbe;
    use plughost_core::headless::{
        HeadlessSandbox, HeadlessWindow, InMemoryBridge, LoadPolicy, StaticWindowDirectory,
    };
    use plughost_plugins::webview::{LAUNCH_DIRECTIVE, RELOAD_DIRECTIVE};
    use plughost_plugins::DevLoaderSettings;
    use serde_json::json;
    use tempfile::TempDir;

    const HOST: &str = "plughost://app/index.html";

    struct Harness {
        scanner: WorkspaceScanner,
        loader: PluginDevLoader,
        webview: PluginWebviewManager,
        sandbox: Arc<HeadlessSandbox>,
        window: Arc<HeadlessWindow>,
        root: TempDir,
    }

    fn harness(busy_ports: &[u16]) -> Harness {
        let sandbox = Arc::new(HeadlessSandbox::with_policy(LoadPolicy::AcceptAll));
        let loader = PluginDevLoader::new(
            sandbox.clone(),
            Arc::new(InMemoryBridge::new()),
            DevLoaderSettings::default(),
        );
        let window = Arc::new(HeadlessWindow::new(HOST));
        let directory = Arc::new(StaticWindowDirectory::new());
        directory.add(window.clone());
        let webview = PluginWebviewManager::new(directory, HOST);
        let settings = ScannerSettings {
            settle_delay: Duration::from_millis(20),
            debounce: Duration::from_millis(50),
            ..Default::default()
        };
        let scanner = WorkspaceScanner::new(
            loader.clone(),
            webview.clone(),
            Arc::new(FakeProbe::busy(busy_ports)),
            settings,
        );
        Harness { scanner, loader, webview, sandbox, window, root: tempfile::tempdir().unwrap() }
    }

    impl Harness {
        fn project(&self, dir: &str, descriptor: serde_json::Value) -> PathBuf {
            let path = self.root.path().join(dir);
            std::fs::create_dir_all(path.join("src")).unwrap();
            std::fs::write(path.join("package.json"), descriptor.to_string()).unwrap();
            path
        }
    }

    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..250 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn alpha_is_discovered_launched_and_hot_reloaded() {
        let h = harness(&[4003]);
        let alpha = h.project(
            "alpha",
            json!({"name": "alpha", "version": "1.0.0", "scripts": {"dev": "vite --port 4000"}}),
        );

        let registered = h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();
        assert_eq!(registered, vec!["alpha".to_string()]);

        let projects = h.scanner.projects().await;
        let project = &projects[0];
        assert_eq!(project.dev_server_port, Some(4003));
        assert!(project.has_dev_server);

        let dev = h.loader.config("alpha").await.unwrap();
        assert_eq!(dev.manifest.entry_file, "index.html");
        assert_eq!(dev.manifest.permissions.len(), 3);

        let webviews = h.webview.list_webview_plugins().await;
        assert_eq!(webviews[0].url, "http://localhost:4003");
        assert!(webviews[0].is_development);
        assert_eq!(h.window.directives_on(LAUNCH_DIRECTIVE).len(), 1);

        assert!(h.loader.launch_dev_plugin("alpha").await.success);
        let session = Arc::clone(&h.sandbox.sessions_for("alpha")[0]);
        assert_eq!(session.loads().len(), 1);

        for file in ["main.ts", "App.vue", "style.css"] {
            assert!(h.scanner.notify_change("alpha", alpha.join("src").join(file)).await);
        }
        let window = Arc::clone(&h.window);
        assert!(eventually(|| {
            let window = Arc::clone(&window);
            async move { !window.directives_on(RELOAD_DIRECTIVE).is_empty() }
        })
        .await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.window.directives_on(RELOAD_DIRECTIVE).len(), 1);
        assert_eq!(session.loads().len(), 2);
    }

    #[tokio::test]
    async fn non_candidates_are_skipped() {
        let h = harness(&[4003, 5173]);
        h.project("alpha", json!({"name": "alpha", "scripts": {"dev": "vite"}}));
        h.project("no-scripts", json!({"name": "no-scripts"}));
        h.project("no-port", json!({"name": "no-port", "scripts": {"start": "node server.js"}}));
        h.project("not-running", json!({"name": "not-running", "scripts": {"dev": "vite --port 9000"}}));
        std::fs::create_dir(h.root.path().join("empty")).unwrap();
        let broken = h.root.path().join("broken");
        std::fs::create_dir(&broken).unwrap();
        std::fs::write(broken.join("package.json"), "{").unwrap();
        std::fs::write(h.root.path().join("README.md"), "# ws").unwrap();

        let registered = h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();
        assert_eq!(registered, vec!["alpha".to_string()]);
        assert_eq!(h.loader.list_dev_plugins().await.len(), 1);
    }

    #[tokio::test]
    async fn inspect_has_no_side_effects() {
        let h = harness(&[4003]);
        let alpha = h.project("alpha", json!({"name": "Alpha App", "scripts": {"dev": "vite --port 4000"}}));

        let project = h.scanner.inspect_project(&alpha).await.unwrap().unwrap();
        assert_eq!(project.id, "alpha");
        assert_eq!(project.name, "Alpha App");
        assert_eq!(project.version, "0.0.0");
        assert!(h.scanner.projects().await.is_empty());
        assert!(h.loader.list_dev_plugins().await.is_empty());
    }

    #[tokio::test]
    async fn file_watcher_option_controls_project_watch() {
        let h = harness(&[4003, 5000]);
        h.project("alpha", json!({"name": "alpha", "scripts": {"dev": "vite --port 4000"}}));
        h.project(
            "quiet",
            json!({"name": "quiet", "scripts": {"dev": "serve -l 5000"}, "development": {"fileWatcher": false}}),
        );

        h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();
        h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();

        assert_eq!(h.scanner.projects().await.len(), 2);
        assert_eq!(h.scanner.watched_projects().await, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn hot_reload_off_ignores_source_changes() {
        let h = harness(&[4003]);
        let alpha = h.project(
            "alpha",
            json!({"name": "alpha", "scripts": {"dev": "vite --port 4000"}, "development": {"hotReload": false}}),
        );
        h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();
        assert!(h.loader.launch_dev_plugin("alpha").await.success);
        let session = Arc::clone(&h.sandbox.sessions_for("alpha")[0]);

        assert!(h.scanner.notify_change("alpha", alpha.join("src").join("main.ts")).await);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(h.window.directives_on(RELOAD_DIRECTIVE).is_empty());
        assert_eq!(session.loads().len(), 1);
    }

    #[tokio::test]
    async fn dev_tools_option_reaches_the_context() {
        let h = harness(&[4003, 5000]);
        h.project("alpha", json!({"name": "alpha", "scripts": {"dev": "vite --port 4000"}}));
        h.project(
            "locked",
            json!({"name": "locked", "scripts": {"dev": "serve -l 5000"}, "development": {"devTools": false}}),
        );
        h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();
        assert_eq!(h.loader.config("locked").await.unwrap().dev_tools, Some(false));

        for id in ["alpha", "locked"] {
            assert!(h.loader.launch_dev_plugin(id).await.success);
        }
        assert!(h.sandbox.sessions_for("alpha")[0].spec().profile.dev_tools);
        assert!(!h.sandbox.sessions_for("locked")[0].spec().profile.dev_tools);
    }

    #[tokio::test]
    async fn new_directory_is_scanned_after_settling() {
        let h = harness(&[5173]);
        h.scanner
            .attach_root_watch(DirectoryWatch::detached(h.root.path(), h.scanner.new_directory_handler()))
            .await;
        assert!(h.scanner.is_watching_root(h.root.path()).await);

        let beta = h.project("beta", json!({"name": "beta", "scripts": {"dev": "vite"}}));
        assert!(h.scanner.notify_new_directory(beta).await);

        let scanner = h.scanner.clone();
        assert!(eventually(|| {
            let scanner = scanner.clone();
            async move { scanner.projects().await.len() == 1 }
        })
        .await);
        assert!(h.loader.config("beta").await.is_some());
    }

    #[tokio::test]
    async fn cleanup_stops_watches_but_leaves_loaders() {
        let h = harness(&[4003]);
        h.project("alpha", json!({"name": "alpha", "scripts": {"dev": "vite --port 4000"}}));
        h.scanner
            .attach_root_watch(DirectoryWatch::detached(h.root.path(), h.scanner.new_directory_handler()))
            .await;
        h.scanner.scan_and_register_projects(h.root.path()).await.unwrap();

        h.scanner.cleanup().await;

        assert!(h.scanner.projects().await.is_empty());
        assert!(h.scanner.watched_projects().await.is_empty());
        assert!(!h.scanner.is_watching_root(h.root.path()).await);
        assert!(h.loader.config("alpha").await.is_some());
        assert!(h.webview.is_registered("alpha").await);
    }
}
