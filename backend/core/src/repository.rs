//! Shared registries keyed by plugin id.
//!
//! Components receive these in their constructors instead of owning ad hoc
//! maps, so two components (or a test) can observe the same registry. Every
//! repository is a cheap `Clone` handle over one `RwLock`-guarded map.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use crate::traits::SandboxedView;

/// Generic id-keyed registry.
pub struct Repository<V> {
    entries: Arc<RwLock<HashMap<String, V>>>,
}

/// Registry of plugin configs.
pub type ConfigRepository<T> = Repository<T>;

impl<V> Repository<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace; returns the previous value.
    pub async fn insert(&self, id: impl Into<String>, value: V) -> Option<V> {
        self.entries.write().await.insert(id.into(), value)
    }

    /// Insert a value built by `build` unless `id` is already present.
    ///
    /// Returns `Ok(true)` when a new entry was created. The check and the
    /// insert happen under one write lock.
    pub async fn insert_with<E>(
        &self,
        id: &str,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<bool, E> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(id) {
            return Ok(false);
        }
        entries.insert(id.to_string(), build()?);
        Ok(true)
    }

    pub async fn remove(&self, id: &str) -> Option<V> {
        self.entries.write().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Run `f` against the entry for `id`, if any.
    pub async fn with<R>(&self, id: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.entries.read().await.get(id).map(f)
    }

    /// Remove and return every entry.
    pub async fn drain(&self) -> Vec<(String, V)> {
        self.entries.write().await.drain().collect()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Ids in sorted order.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<V: Clone> Repository<V> {
    pub async fn get(&self, id: &str) -> Option<V> {
        self.entries.read().await.get(id).cloned()
    }

    /// Values ordered by id.
    pub async fn values(&self) -> Vec<V> {
        let entries = self.entries.read().await;
        let mut ids: Vec<&String> = entries.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| entries.get(id).cloned()).collect()
    }
}

impl<V> Clone for Repository<V> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}

impl<V> Default for Repository<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Running-context map: plugin id → open isolated context.
pub type ContextRepository = Repository<Arc<dyn SandboxedView>>;

impl Repository<Arc<dyn SandboxedView>> {
    /// The context for `id` if it exists and has not been destroyed.
    pub async fn live(&self, id: &str) -> Option<Arc<dyn SandboxedView>> {
        self.entries
            .read()
            .await
            .get(id)
            .filter(|view| !view.is_destroyed())
            .cloned()
    }

    /// Remove `id` only while it still refers to `expected`.
    ///
    /// Close callbacks use this so a late close event from an old context
    /// cannot evict a newer context registered under the same id.
    pub async fn remove_if_same(&self, id: &str, expected: &Weak<dyn SandboxedView>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(current) if same_context(current, expected) => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }
}

fn same_context(current: &Arc<dyn SandboxedView>, expected: &Weak<dyn SandboxedView>) -> bool {
    Arc::as_ptr(current) as *const () == expected.as_ptr() as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessSandbox, LoadPolicy};
    use crate::traits::SandboxService;
    use crate::types::ContextSpec;

    #[tokio::test]
    async fn insert_with_is_idempotent() {
        let repo: Repository<u32> = Repository::new();
        let created = repo.insert_with::<()>("a", || Ok(1)).await.unwrap();
        let again = repo.insert_with::<()>("a", || Ok(2)).await.unwrap();
        assert!(created);
        assert!(!again);
        assert_eq!(repo.get("a").await, Some(1));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn values_are_sorted_by_id() {
        let repo: Repository<&str> = Repository::new();
        repo.insert("b", "second").await;
        repo.insert("a", "first").await;
        assert_eq!(repo.values().await, vec!["first", "second"]);
        assert_eq!(repo.ids().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn live_skips_destroyed_contexts() {
        let sandbox = HeadlessSandbox::with_policy(LoadPolicy::AcceptAll);
        let view = sandbox
            .create_isolated_context(ContextSpec::restrictive("a", "A"))
            .await
            .unwrap();
        let repo = ContextRepository::new();
        repo.insert("a", Arc::clone(&view)).await;
        assert!(repo.live("a").await.is_some());
        view.close();
        assert!(repo.live("a").await.is_none());
        assert!(repo.contains("a").await);
    }

    #[tokio::test]
    async fn remove_if_same_ignores_replaced_context() {
        let sandbox = HeadlessSandbox::with_policy(LoadPolicy::AcceptAll);
        let old = sandbox
            .create_isolated_context(ContextSpec::restrictive("a", "A"))
            .await
            .unwrap();
        let new = sandbox
            .create_isolated_context(ContextSpec::restrictive("a", "A"))
            .await
            .unwrap();
        let repo = ContextRepository::new();
        repo.insert("a", Arc::clone(&new)).await;

        assert!(!repo.remove_if_same("a", &Arc::downgrade(&old)).await);
        assert!(repo.contains("a").await);
        assert!(repo.remove_if_same("a", &Arc::downgrade(&new)).await);
        assert!(repo.is_empty().await);
    }
}
