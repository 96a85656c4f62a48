/// Installed plugin manifest loading.
///
/// An installed plugin package carries a `manifest.json` at its root.
use std::path::Path;

use anyhow::{Context, Result};
use plughost_core::Manifest;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Read and validate `manifest.json` from a plugin directory.
pub async fn load_manifest(plugin_dir: &Path) -> Result<Manifest> {
    let manifest_path = plugin_dir.join(MANIFEST_FILE_NAME);
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .with_context(|| format!("read manifest at {:?}", manifest_path))?;
    parse_manifest(&raw)
}

pub fn parse_manifest(raw: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_json::from_str(raw).context("parse plugin manifest")?;
    manifest.validate()?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_manifest_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"{"id":"notes","name":"Notes","version":"1.2.0","main":"index.html","permissions":["storage"]}"#,
        )
        .unwrap();

        let manifest = load_manifest(dir.path()).await.unwrap();
        assert_eq!(manifest.id, "notes");
        assert_eq!(manifest.entry_file, "index.html");
        assert!(manifest.permissions.contains("storage"));
    }

    #[tokio::test]
    async fn missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("read manifest"));
    }

    #[test]
    fn rejects_manifest_without_id() {
        let raw = r#"{"id":"","name":"Notes","version":"1.0.0","main":"index.html"}"#;
        assert!(parse_manifest(raw).is_err());
    }
}
