//! Project descriptor (`package.json`) parsing.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The parts of a project descriptor the scanner reads. Unknown keys are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default)]
    pub scripts: Scripts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<DevelopmentOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowOptions>,
}

/// `author` may be a plain string or a person object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Person {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
}

impl Author {
    pub fn name(&self) -> &str {
        match self {
            Author::Name(name) | Author::Person { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentOptions {
    #[serde(default = "enabled")]
    pub hot_reload: bool,
    #[serde(default = "enabled")]
    pub dev_tools: bool,
    #[serde(default = "enabled")]
    pub file_watcher: bool,
}

impl Default for DevelopmentOptions {
    fn default() -> Self {
        Self { hot_reload: true, dev_tools: true, file_watcher: true }
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resizable: Option<bool>,
}

impl ProjectDescriptor {
    /// The script that starts the dev server; `dev` wins over `start`.
    pub fn dev_script(&self) -> Option<&str> {
        [&self.scripts.dev, &self.scripts.start]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    pub fn development_options(&self) -> DevelopmentOptions {
        self.development.clone().unwrap_or_default()
    }
}

/// Read `dir/file_name`. `Ok(None)` when the project has no descriptor.
pub async fn read_descriptor(dir: &Path, file_name: &str) -> Result<Option<ProjectDescriptor>> {
    let path = dir.join(file_name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(None);
    }
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("read descriptor {}", path.display()))?;
    let descriptor = serde_json::from_str(&raw)
        .with_context(|| format!("parse descriptor {}", path.display()))?;
    Ok(Some(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_script_prefers_dev_over_start() {
        let d: ProjectDescriptor = serde_json::from_str(
            r#"{"name":"alpha","version":"1.0.0","scripts":{"start":"node server.js","dev":"vite","build":"vite build"}}"#,
        )
        .unwrap();
        assert_eq!(d.dev_script(), Some("vite"));

        let d: ProjectDescriptor =
            serde_json::from_str(r#"{"name":"beta","scripts":{"dev":"  ","start":"next start"}}"#).unwrap();
        assert_eq!(d.dev_script(), Some("next start"));

        let d: ProjectDescriptor = serde_json::from_str(r#"{"name":"gamma"}"#).unwrap();
        assert_eq!(d.dev_script(), None);
    }

    #[test]
    fn development_options_default_to_enabled() {
        let d: ProjectDescriptor =
            serde_json::from_str(r#"{"name":"a","development":{"fileWatcher":false}}"#).unwrap();
        let opts = d.development_options();
        assert!(opts.hot_reload);
        assert!(opts.dev_tools);
        assert!(!opts.file_watcher);

        let d: ProjectDescriptor = serde_json::from_str(r#"{"name":"a"}"#).unwrap();
        assert_eq!(d.development_options(), DevelopmentOptions::default());
    }

    #[test]
    fn author_accepts_string_or_person() {
        let d: ProjectDescriptor = serde_json::from_str(r#"{"name":"a","author":"Ana"}"#).unwrap();
        assert_eq!(d.author.unwrap().name(), "Ana");
        let d: ProjectDescriptor =
            serde_json::from_str(r#"{"name":"a","author":{"name":"Bo","email":"bo@example.com"}}"#).unwrap();
        assert_eq!(d.author.unwrap().name(), "Bo");
    }

    #[tokio::test]
    async fn missing_descriptor_is_none_and_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_descriptor(dir.path(), "package.json").await.unwrap().is_none());

        std::fs::write(dir.path().join("package.json"), "{ not json").unwrap();
        assert!(read_descriptor(dir.path(), "package.json").await.is_err());
    }
}
