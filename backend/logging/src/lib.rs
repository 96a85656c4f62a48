//! Telemetry and structured logging components for plughost.
//!
//! Handles subscriber setup, console + rolling NDJSON output, secret
//! redaction, and the plugin lifecycle event log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{PluginEvent, PluginEventEntry, PluginEventLogger};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
