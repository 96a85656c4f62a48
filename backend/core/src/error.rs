use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for plugin lifecycle operations.
///
/// Public loader/manager operations never return this directly; it is
/// rendered into an [`OpResult`](crate::types::OpResult) at the boundary.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("source path does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("plugin {0} not found")]
    NotFound(String),

    #[error("plugin {0} is not running")]
    NotRunning(String),

    #[error("plugin {0} is disabled")]
    Disabled(String),

    #[error("main window not found")]
    HostWindowNotFound,

    #[error("no content source available for plugin {0}")]
    NoContentSource(String),

    #[error("plugin window not found or destroyed")]
    ContextUnavailable(String),

    #[error("context for plugin {0} was destroyed")]
    ContextDestroyed(String),

    #[error("invalid plugin config: {0}")]
    InvalidConfig(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;
