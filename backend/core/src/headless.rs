//! Headless collaborators: logical sessions instead of native windows.
//!
//! Used by the `plughost` binary when no GUI shell is attached, and by tests
//! across the workspace. Every call is recorded so callers can inspect what
//! a component asked its collaborators to do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::traits::{ClosedCallback, HostWindow, MessageBridge, SandboxService, SandboxedView, WindowDirectory};
use crate::types::{ContentSource, ContextSpec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a logical session decides whether a load succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// URLs must accept a TCP connection; files must exist.
    #[default]
    Probe,
    /// Every load succeeds.
    AcceptAll,
    /// URL loads fail; files must exist.
    RejectUrls,
    /// Every load fails.
    RejectAll,
}

// ---------------------------------------------------------------------------
// Logical sessions
// ---------------------------------------------------------------------------

/// A no-op isolated context that records what was asked of it.
pub struct LogicalSession {
    session_id: Uuid,
    spec: ContextSpec,
    policy: LoadPolicy,
    destroyed: AtomicBool,
    focus_count: AtomicUsize,
    close_count: AtomicUsize,
    loads: Mutex<Vec<ContentSource>>,
    messages: Mutex<Vec<(String, Value)>>,
    on_closed: Mutex<Vec<ClosedCallback>>,
}

impl LogicalSession {
    pub fn new(spec: ContextSpec, policy: LoadPolicy) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            spec,
            policy,
            destroyed: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            loads: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            on_closed: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn spec(&self) -> &ContextSpec {
        &self.spec
    }

    /// Every load attempted, successful or not, in order.
    pub fn loads(&self) -> Vec<ContentSource> {
        lock(&self.loads).clone()
    }

    pub fn messages(&self) -> Vec<(String, Value)> {
        lock(&self.messages).clone()
    }

    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// Number of close instructions received, including repeats.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxedView for LogicalSession {
    fn plugin_id(&self) -> &str {
        &self.spec.plugin_id
    }

    async fn load(&self, source: &ContentSource) -> Result<()> {
        if self.is_destroyed() {
            bail!("session for {} is destroyed", self.spec.plugin_id);
        }
        lock(&self.loads).push(source.clone());
        match (self.policy, source) {
            (LoadPolicy::AcceptAll, _) => {}
            (LoadPolicy::RejectAll, _) => bail!("refused to load {source}"),
            (LoadPolicy::RejectUrls, ContentSource::Url(url)) => bail!("refused to load {url}"),
            (LoadPolicy::Probe, ContentSource::Url(url)) => probe_url(url).await?,
            (_, ContentSource::File(path)) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    bail!("file not found: {}", path.display());
                }
            }
        }
        debug!(plugin = %self.spec.plugin_id, session = %self.session_id, source = %source, "Logical session loaded");
        Ok(())
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(plugin = %self.spec.plugin_id, session = %self.session_id, "Logical session closed");
        let callbacks: Vec<ClosedCallback> = lock(&self.on_closed).drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn on_closed(&self, callback: ClosedCallback) {
        if self.is_destroyed() {
            callback();
            return;
        }
        lock(&self.on_closed).push(callback);
    }

    fn post_message(&self, channel: &str, payload: Value) -> Result<()> {
        if self.is_destroyed() {
            bail!("session for {} is destroyed", self.spec.plugin_id);
        }
        lock(&self.messages).push((channel.to_string(), payload));
        Ok(())
    }
}

/// Succeeds if something accepts TCP connections at the URL's authority.
async fn probe_url(url: &str) -> Result<()> {
    let authority = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or_default();
    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    match tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => bail!("cannot reach {url}: {e}"),
        Err(_) => bail!("timed out connecting to {url}"),
    }
}

/// Sandbox service producing [`LogicalSession`]s.
#[derive(Default)]
pub struct HeadlessSandbox {
    policy: LoadPolicy,
    sessions: Mutex<Vec<Arc<LogicalSession>>>,
}

impl HeadlessSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: LoadPolicy) -> Self {
        Self { policy, sessions: Mutex::new(Vec::new()) }
    }

    /// Every session created so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<LogicalSession>> {
        lock(&self.sessions).clone()
    }

    pub fn sessions_for(&self, plugin_id: &str) -> Vec<Arc<LogicalSession>> {
        lock(&self.sessions)
            .iter()
            .filter(|s| s.plugin_id() == plugin_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SandboxService for HeadlessSandbox {
    async fn create_isolated_context(&self, spec: ContextSpec) -> Result<Arc<dyn SandboxedView>> {
        let session = Arc::new(LogicalSession::new(spec, self.policy));
        info!(
            plugin = %session.plugin_id(),
            session = %session.session_id(),
            permissions = ?session.spec().permissions,
            "Logical session created"
        );
        lock(&self.sessions).push(Arc::clone(&session));
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Host windows
// ---------------------------------------------------------------------------

/// A host window that records every directive it receives.
pub struct HeadlessWindow {
    url: Mutex<String>,
    directives: Mutex<Vec<(String, Value)>>,
}

impl HeadlessWindow {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(url.into()),
            directives: Mutex::new(Vec::new()),
        }
    }

    /// Point the window at a different address.
    pub fn navigate(&self, url: impl Into<String>) {
        *lock(&self.url) = url.into();
    }

    pub fn directives(&self) -> Vec<(String, Value)> {
        lock(&self.directives).clone()
    }

    /// Directives sent on `channel`, payloads only.
    pub fn directives_on(&self, channel: &str) -> Vec<Value> {
        lock(&self.directives)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl HostWindow for HeadlessWindow {
    fn current_url(&self) -> String {
        lock(&self.url).clone()
    }

    fn send(&self, channel: &str, payload: Value) -> Result<()> {
        debug!(channel = %channel, "Host window directive");
        lock(&self.directives).push((channel.to_string(), payload));
        Ok(())
    }
}

/// Fixed list of windows, in creation order.
#[derive(Default)]
pub struct StaticWindowDirectory {
    windows: Mutex<Vec<Arc<dyn HostWindow>>>,
}

impl StaticWindowDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, window: Arc<dyn HostWindow>) {
        lock(&self.windows).push(window);
    }
}

impl WindowDirectory for StaticWindowDirectory {
    fn windows(&self) -> Vec<Arc<dyn HostWindow>> {
        lock(&self.windows).clone()
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Message bridge that only tracks which contexts are registered.
#[derive(Default)]
pub struct InMemoryBridge {
    contexts: Mutex<HashMap<String, Arc<dyn SandboxedView>>>,
    unregistrations: AtomicUsize,
}

impl InMemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, plugin_id: &str) -> bool {
        lock(&self.contexts).contains_key(plugin_id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.contexts).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn unregistration_count(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }

    /// Forward a message to a registered context.
    pub fn route(&self, plugin_id: &str, channel: &str, payload: Value) -> Result<()> {
        let view = lock(&self.contexts).get(plugin_id).cloned();
        match view {
            Some(view) => view.post_message(channel, payload),
            None => bail!("no context registered for {plugin_id}"),
        }
    }
}

impl MessageBridge for InMemoryBridge {
    fn register_context(&self, plugin_id: &str, view: Arc<dyn SandboxedView>) {
        lock(&self.contexts).insert(plugin_id.to_string(), view);
    }

    fn unregister_context(&self, plugin_id: &str) {
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        lock(&self.contexts).remove(plugin_id);
    }
}
