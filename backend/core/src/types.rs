use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Permissions every auto-discovered workspace project is granted.
pub const BASELINE_PERMISSIONS: [&str; 3] = ["storage", "notifications", "communication"];

// ---------------------------------------------------------------------------
// Manifests and plugin configs
// ---------------------------------------------------------------------------

/// Declarative plugin metadata (the `manifest.json` shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Entry point relative to the plugin root.
    #[serde(rename = "main")]
    pub entry_file: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Manifest {
    /// Validate the manifest for required fields.
    pub fn validate(&self) -> PluginResult<()> {
        if self.id.trim().is_empty() {
            return Err(PluginError::InvalidManifest("missing 'id'".into()));
        }
        check_plugin_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest(format!("plugin {} is missing 'name'", self.id)));
        }
        if self.entry_file.trim().is_empty() {
            return Err(PluginError::InvalidManifest(format!("plugin {} is missing 'main'", self.id)));
        }
        Ok(())
    }
}

/// Plugin ids name directories, so an id must be one plain path component.
pub fn check_plugin_id(id: &str) -> PluginResult<()> {
    let mut parts = Path::new(id).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(name)), None) if name == id && !id.contains(['/', '\\']) => Ok(()),
        _ => Err(PluginError::InvalidManifest(format!("plugin id {id:?} is not a plain directory name"))),
    }
}

/// A file-backed plugin owned by the dev loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevPluginConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    pub source_path: PathBuf,
    /// Open contexts with dev tools; unset follows the loader's mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_tools: Option<bool>,
    pub manifest: Manifest,
}

/// A URL-backed plugin rendered inline inside the host window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebviewPluginConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub is_development: bool,
    pub manifest: Manifest,
}

/// Persisted record of an installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    pub enabled: bool,
    pub installed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Operation outcomes
// ---------------------------------------------------------------------------

/// Uniform `{success, message}` shape returned by every public operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    pub success: bool,
    pub message: String,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

impl From<PluginError> for OpResult {
    fn from(err: PluginError) -> Self {
        Self::fail(err.to_string())
    }
}

impl From<PluginResult<String>> for OpResult {
    fn from(res: PluginResult<String>) -> Self {
        match res {
            Ok(message) => Self::ok(message),
            Err(err) => err.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Isolated contexts
// ---------------------------------------------------------------------------

/// Where a context's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum ContentSource {
    /// A live development server.
    Url(String),
    /// A packaged file on disk.
    File(PathBuf),
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Url(url) => write!(f, "{url}"),
            ContentSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// What an isolated context is allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProfile {
    /// Whether host-privileged APIs are exposed directly to the plugin.
    pub privileged_api: bool,
    /// Whether the plugin runs in its own isolated world.
    pub isolated: bool,
    pub dev_tools: bool,
}

impl CapabilityProfile {
    pub fn restrictive() -> Self {
        Self { privileged_api: false, isolated: true, dev_tools: false }
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::restrictive()
    }
}

/// Request passed to the sandbox service when creating a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSpec {
    pub plugin_id: String,
    pub title: String,
    pub permissions: BTreeSet<String>,
    pub profile: CapabilityProfile,
    /// Arguments injected at creation time.
    pub arguments: Vec<String>,
}

impl ContextSpec {
    /// Restrictive profile with the plugin id injected as `--plugin-id=<id>`.
    pub fn restrictive(plugin_id: &str, title: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            title: title.to_string(),
            permissions: BTreeSet::new(),
            profile: CapabilityProfile::restrictive(),
            arguments: vec![format!("--plugin-id={plugin_id}")],
        }
    }

    /// Restrictive profile constrained to the manifest's declared permissions.
    pub fn for_manifest(manifest: &Manifest) -> Self {
        Self {
            permissions: manifest.permissions.clone(),
            ..Self::restrictive(&manifest.id, &manifest.name)
        }
    }

    pub fn with_dev_tools(mut self, enabled: bool) -> Self {
        self.profile.dev_tools = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        Manifest {
            id: "alpha".into(),
            name: "Alpha".into(),
            version: "1.0.0".into(),
            description: String::new(),
            author: String::new(),
            entry_file: "index.html".into(),
            permissions: ["storage".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn manifest_reads_main_as_entry_file() {
        let raw = r#"{"id":"a","name":"A","version":"0.1.0","main":"dist/index.html","permissions":["storage","storage"]}"#;
        let m: Manifest = serde_json::from_str(raw).unwrap();
        assert_eq!(m.entry_file, "dist/index.html");
        assert_eq!(m.permissions.len(), 1);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn manifest_without_main_is_invalid() {
        let mut m = manifest();
        m.entry_file = " ".into();
        assert!(matches!(m.validate(), Err(PluginError::InvalidManifest(_))));
    }

    #[test]
    fn ids_that_leave_their_directory_are_invalid() {
        for id in ["../escaped", "/etc", "a/b", "a\\b", "..", ".", "notes/"] {
            let mut m = manifest();
            m.id = id.into();
            assert!(matches!(m.validate(), Err(PluginError::InvalidManifest(_))), "{id}");
        }
        assert!(check_plugin_id("hello-world").is_ok());
        assert!(check_plugin_id("my.plugin_2").is_ok());
    }

    #[test]
    fn restrictive_spec_injects_plugin_id() {
        let spec = ContextSpec::for_manifest(&manifest());
        assert_eq!(spec.arguments, vec!["--plugin-id=alpha".to_string()]);
        assert!(!spec.profile.privileged_api);
        assert!(spec.permissions.contains("storage"));
    }

    #[test]
    fn op_result_from_error() {
        let res: OpResult = PluginError::HostWindowNotFound.into();
        assert!(!res.success);
        assert_eq!(res.message, "main window not found");
    }
}
