//! Filesystem watches that feed plugin reloads.
//!
//! A [`SourceWatch`] follows a plugin's source tree and coalesces bursts of
//! changes into one callback per quiet period. A [`DirectoryWatch`] reports
//! new immediate subdirectories of a workspace root.
//!
//! Both forward raw paths from the `notify` thread into a tokio task through
//! an unbounded channel; the same channel accepts paths injected with
//! `notify(..)`, which is how detached watches (no OS watcher) are driven.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Invoked once per debounced burst of source changes.
pub type ChangeCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked with the path of each newly created subdirectory.
pub type CreatedCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Decides which changed paths count as source changes.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
}

impl ChangeFilter {
    /// Accept paths with one of `extensions` (leading dots optional).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignored_dirs: Vec::new(),
        }
    }

    /// Reject any path with one of `dirs` as a component.
    pub fn ignoring<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_dirs = dirs.into_iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn matches(&self, path: &Path) -> bool {
        let ignored = path.components().any(|c| match c {
            Component::Normal(name) => self.ignored_dirs.iter().any(|d| name == d.as_str()),
            _ => false,
        });
        if ignored {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => true,
        _ => false,
    }
}

/// Paths that appeared through `event`: creations and rename targets.
fn arrived_paths(event: notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Source watch
// ---------------------------------------------------------------------------

/// Recursive, debounced watch over one plugin's source tree.
///
/// Dropping (or [`close`](Self::close)-ing) the watch stops the OS watcher
/// and the debounce task; a pending, not yet fired reload is discarded.
pub struct SourceWatch {
    root: PathBuf,
    feed: mpsc::UnboundedSender<PathBuf>,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl SourceWatch {
    /// Start watching `root` recursively. Must run inside a tokio runtime.
    pub fn start(
        root: &Path,
        filter: ChangeFilter,
        delay: Duration,
        on_change: ChangeCallback,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_content_change(&event.kind) => {
                    for path in event.paths {
                        let _ = forward.send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Source watch error"),
            }
        })
        .context("create file watcher")?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watch {}", root.display()))?;
        info!(root = %root.display(), "Watching plugin sources");

        Ok(Self {
            root: root.to_path_buf(),
            feed: tx,
            task: spawn_debounced(rx, filter, delay, on_change),
            _watcher: Some(watcher),
        })
    }

    /// A watch with no OS watcher; changes arrive only through [`notify`](Self::notify).
    pub fn detached(root: &Path, filter: ChangeFilter, delay: Duration, on_change: ChangeCallback) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            root: root.to_path_buf(),
            feed: tx,
            task: spawn_debounced(rx, filter, delay, on_change),
            _watcher: None,
        }
    }

    /// Feed a changed path into the debouncer as if the OS reported it.
    pub fn notify(&self, path: impl Into<PathBuf>) -> bool {
        self.feed.send(path.into()).is_ok()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn close(self) {
        debug!(root = %self.root.display(), "Closing source watch");
    }
}

impl Drop for SourceWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reset-on-event debounce: `on_change` fires once `delay` passes with no
/// further matching path.
fn spawn_debounced(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    filter: ChangeFilter,
    delay: Duration,
    on_change: ChangeCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            loop {
                match rx.recv().await {
                    Some(path) if filter.matches(&path) => {
                        trace!(path = %path.display(), "Source change");
                        break;
                    }
                    Some(path) => trace!(path = %path.display(), "Ignoring change"),
                    None => return,
                }
            }

            let mut coalesced = 1usize;
            let quiet = tokio::time::sleep(delay);
            tokio::pin!(quiet);
            loop {
                tokio::select! {
                    _ = &mut quiet => break,
                    next = rx.recv() => match next {
                        Some(path) if filter.matches(&path) => {
                            coalesced += 1;
                            quiet.as_mut().reset(Instant::now() + delay);
                        }
                        Some(_) => {}
                        None => return,
                    },
                }
            }

            debug!(events = coalesced, "Debounce window elapsed");
            // Not awaited: nothing fences this reload against the next one,
            // so an older, slower load can finish after a newer one.
            tokio::spawn(on_change());
        }
    })
}

// ---------------------------------------------------------------------------
// Directory watch
// ---------------------------------------------------------------------------

/// Non-recursive watch reporting new immediate subdirectories of a root.
pub struct DirectoryWatch {
    root: PathBuf,
    feed: mpsc::UnboundedSender<PathBuf>,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl DirectoryWatch {
    pub fn start(root: &Path, on_created: CreatedCallback) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for path in arrived_paths(event) {
                        let _ = forward.send(path);
                    }
                }
                Err(e) => warn!(error = %e, "Directory watch error"),
            }
        })
        .context("create directory watcher")?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", root.display()))?;
        info!(root = %root.display(), "Watching workspace root for new projects");

        Ok(Self {
            root: root.to_path_buf(),
            feed: tx,
            task: spawn_created_listener(root.to_path_buf(), rx, on_created),
            _watcher: Some(watcher),
        })
    }

    pub fn detached(root: &Path, on_created: CreatedCallback) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            root: root.to_path_buf(),
            feed: tx,
            task: spawn_created_listener(root.to_path_buf(), rx, on_created),
            _watcher: None,
        }
    }

    /// Report `path` as created.
    pub fn notify(&self, path: impl Into<PathBuf>) -> bool {
        self.feed.send(path.into()).is_ok()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn close(self) {
        debug!(root = %self.root.display(), "Closing directory watch");
    }
}

impl Drop for DirectoryWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_created_listener(
    root: PathBuf,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    on_created: CreatedCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(path) = rx.recv().await {
            if path.parent() != Some(root.as_path()) {
                continue;
            }
            let is_dir = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if is_dir {
                debug!(path = %path.display(), "New directory under workspace root");
                on_created(path);
            }
        }
    })
}
