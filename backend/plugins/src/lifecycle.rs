//! Bookkeeping for open plugin contexts.
//!
//! A tracked context is registered with the message bridge and recorded in
//! a running map. When the context reports itself closed the entry is
//! dropped again, but only if it still refers to that same context.

use std::sync::Arc;

use plughost_core::{ContextRepository, MessageBridge, SandboxedView};
use plughost_logging::{PluginEvent, PluginEventLogger};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Register `view` under `id` and untrack it when it closes.
///
/// Must be called from inside a tokio runtime.
pub async fn track_context(
    running: &ContextRepository,
    bridge: &Arc<dyn MessageBridge>,
    id: &str,
    view: &Arc<dyn SandboxedView>,
) {
    bridge.register_context(id, Arc::clone(view));
    running.insert(id, Arc::clone(view)).await;

    let running = running.clone();
    let bridge = Arc::clone(bridge);
    let plugin_id = id.to_string();
    let weak = Arc::downgrade(view);
    // Close events can arrive on a non-runtime thread.
    let handle = Handle::current();
    view.on_closed(Box::new(move || {
        handle.spawn(async move {
            if running.remove_if_same(&plugin_id, &weak).await {
                bridge.unregister_context(&plugin_id);
                info!(plugin = %plugin_id, "Plugin context closed");
                PluginEventLogger::log_event(&plugin_id, PluginEvent::Closed);
            }
        });
    }));
}

/// Undo [`track_context`] for a context that failed to load, and close it.
pub async fn discard_context(
    running: &ContextRepository,
    bridge: &Arc<dyn MessageBridge>,
    id: &str,
    view: &Arc<dyn SandboxedView>,
) {
    running.remove_if_same(id, &Arc::downgrade(view)).await;
    bridge.unregister_context(id);
    view.close();
}

/// Close the context tracked under `id`. Returns `false` if none was.
pub async fn close_tracked(running: &ContextRepository, bridge: &Arc<dyn MessageBridge>, id: &str) -> bool {
    let Some(view) = running.remove(id).await else {
        return false;
    };
    bridge.unregister_context(id);
    view.close();
    PluginEventLogger::log_event(id, PluginEvent::Closed);
    true
}

/// Close every tracked context exactly once; returns how many were closed.
pub async fn close_all(running: &ContextRepository, bridge: &Arc<dyn MessageBridge>) -> usize {
    let drained = running.drain().await;
    let count = drained.len();
    for (id, view) in drained {
        debug!(plugin = %id, "Closing plugin context");
        bridge.unregister_context(&id);
        view.close();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_core::headless::{HeadlessSandbox, InMemoryBridge, LoadPolicy};
    use plughost_core::{ContextSpec, SandboxService};

    async fn open(sandbox: &HeadlessSandbox, id: &str) -> Arc<dyn SandboxedView> {
        sandbox
            .create_isolated_context(ContextSpec::restrictive(id, id))
            .await
            .unwrap()
    }

    async fn wait_until_gone(running: &ContextRepository, id: &str) {
        for _ in 0..100 {
            if !running.contains(id).await {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn close_event_untracks_context() {
        let sandbox = HeadlessSandbox::with_policy(LoadPolicy::AcceptAll);
        let bridge_impl = Arc::new(InMemoryBridge::new());
        let bridge: Arc<dyn MessageBridge> = bridge_impl.clone();
        let running = ContextRepository::new();
        let view = open(&sandbox, "alpha").await;

        track_context(&running, &bridge, "alpha", &view).await;
        assert!(bridge_impl.is_registered("alpha"));

        view.close();
        wait_until_gone(&running, "alpha").await;
        assert!(!running.contains("alpha").await);
        assert!(!bridge_impl.is_registered("alpha"));
    }

    #[tokio::test]
    async fn stale_close_event_keeps_replacement() {
        let sandbox = HeadlessSandbox::with_policy(LoadPolicy::AcceptAll);
        let bridge_impl = Arc::new(InMemoryBridge::new());
        let bridge: Arc<dyn MessageBridge> = bridge_impl.clone();
        let running = ContextRepository::new();

        let old = open(&sandbox, "alpha").await;
        track_context(&running, &bridge, "alpha", &old).await;
        let new = open(&sandbox, "alpha").await;
        track_context(&running, &bridge, "alpha", &new).await;

        old.close();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(running.live("alpha").await.is_some());
        assert!(bridge_impl.is_registered("alpha"));
    }

    #[tokio::test]
    async fn close_all_closes_each_once() {
        let sandbox = HeadlessSandbox::with_policy(LoadPolicy::AcceptAll);
        let bridge_impl = Arc::new(InMemoryBridge::new());
        let bridge: Arc<dyn MessageBridge> = bridge_impl.clone();
        let running = ContextRepository::new();
        for id in ["a", "b", "c"] {
            let view = open(&sandbox, id).await;
            track_context(&running, &bridge, id, &view).await;
        }

        assert_eq!(close_all(&running, &bridge).await, 3);
        assert!(running.is_empty().await);
        assert!(bridge_impl.registered_ids().is_empty());
        assert!(sandbox.sessions().iter().all(|s| s.close_count() == 1));
        assert!(!close_tracked(&running, &bridge, "a").await);
    }
}
