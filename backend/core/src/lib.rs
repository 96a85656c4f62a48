//! Core types, collaborator traits, and shared registries for plughost.

pub mod error;
pub mod headless;
pub mod repository;
pub mod traits;
pub mod types;

pub use error::{PluginError, PluginResult};
pub use repository::{ConfigRepository, ContextRepository, Repository};
pub use traits::{
    ClosedCallback, HostWindow, Installer, MessageBridge, PluginStore, SandboxService,
    SandboxedView, WindowDirectory,
};
pub use types::{
    CapabilityProfile, ContentSource, ContextSpec, DevPluginConfig, Manifest, OpResult,
    PluginRecord, WebviewPluginConfig, BASELINE_PERMISSIONS, check_plugin_id,
};
