//! Plugin Event Logger
//!
//! Structured lifecycle events (registered, launched, reloaded, closed, ...)
//! emitted on the `plugin_events` tracing target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginEvent {
    Registered { source: String },
    Discovered { port: u16 },
    Launched { source: String },
    Reloaded { source: String },
    FallbackToDisk { reason: String },
    Closed,
    Failed { error: String },
}

impl PluginEvent {
    fn redact(&mut self) {
        match self {
            PluginEvent::Registered { source }
            | PluginEvent::Launched { source }
            | PluginEvent::Reloaded { source } => *source = redact_sensitive_data(source),
            PluginEvent::FallbackToDisk { reason } => *reason = redact_sensitive_data(reason),
            PluginEvent::Failed { error } => *error = redact_sensitive_data(error),
            PluginEvent::Discovered { .. } | PluginEvent::Closed => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PluginEventEntry {
    pub plugin_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: PluginEvent,
}

pub struct PluginEventLogger;

impl PluginEventLogger {
    /// Builds the redacted entry for an event without emitting it.
    pub fn entry(plugin_id: &str, mut event: PluginEvent) -> PluginEventEntry {
        event.redact();
        PluginEventEntry {
            plugin_id: plugin_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }

    /// Logs a plugin lifecycle event, redacting string contents first.
    pub fn log_event(plugin_id: &str, event: PluginEvent) {
        let entry = Self::entry(plugin_id, event);
        info!(target: "plugin_events", plugin = %entry.plugin_id, event = ?entry.event, "Plugin lifecycle event");
    }
}
