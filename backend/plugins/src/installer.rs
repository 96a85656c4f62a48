/// Plugin installer: copy plugin packages into the plugins directory.
///
/// Packages are plain directories carrying a `manifest.json`; the installed
/// copy lives at `<plugins_dir>/<manifest id>`.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use plughost_core::{check_plugin_id, Installer, PluginRecord};
use tracing::info;

use crate::manifest::load_manifest;

pub struct DirectoryInstaller {
    pub plugins_dir: PathBuf,
}

impl DirectoryInstaller {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self { plugins_dir: plugins_dir.into() }
    }
}

#[async_trait]
impl Installer for DirectoryInstaller {
    async fn install(&self, source: &Path) -> Result<PluginRecord> {
        if !tokio::fs::metadata(source).await.map(|m| m.is_dir()).unwrap_or(false) {
            bail!("Source is not a directory: {:?}", source);
        }
        let manifest = load_manifest(source).await?;
        let dest = self.plugins_dir.join(&manifest.id);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            bail!("Plugin '{}' is already installed", manifest.id);
        }
        tokio::fs::create_dir_all(&self.plugins_dir).await?;

        let (src, dst) = (source.to_path_buf(), dest.clone());
        tokio::task::spawn_blocking(move || copy_dir(&src, &dst))
            .await
            .context("join copy task")?
            .context("copy plugin dir")?;
        info!(plugin = %manifest.id, path = ?dest, "Installed plugin");

        Ok(PluginRecord {
            id: manifest.id,
            name: manifest.name,
            version: manifest.version,
            install_path: dest,
            enabled: true,
            installed_at: Utc::now(),
        })
    }

    async fn uninstall(&self, plugin_id: &str) -> Result<()> {
        check_plugin_id(plugin_id)?;
        let path = self.plugins_dir.join(plugin_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("Plugin '{}' not found in {:?}", plugin_id, self.plugins_dir);
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .with_context(|| format!("remove plugin dir {:?}", path))?;
        info!(plugin = %plugin_id, "Uninstalled plugin");
        Ok(())
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE_NAME;

    /// Write a minimal installable package named `id` under `root`.
    pub(crate) fn write_package(root: &Path, id: &str, permissions: &[&str]) -> PathBuf {
        let dir = root.join(format!("{id}-src"));
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        let manifest = serde_json::json!({
            "id": id,
            "name": id.to_uppercase(),
            "version": "1.0.0",
            "main": "index.html",
            "permissions": permissions,
        });
        std::fs::write(dir.join(MANIFEST_FILE_NAME), manifest.to_string()).unwrap();
        std::fs::write(dir.join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.join("assets").join("app.css"), "body{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn install_copies_package_under_manifest_id() {
        let tmp = tempfile::tempdir().unwrap();
        let package = write_package(tmp.path(), "notes", &["storage"]);
        let installer = DirectoryInstaller::new(tmp.path().join("plugins"));

        let record = installer.install(&package).await.unwrap();
        assert_eq!(record.id, "notes");
        assert!(record.enabled);
        assert!(record.install_path.join("assets").join("app.css").exists());
        assert_eq!(record.install_path, tmp.path().join("plugins").join("notes"));

        let again = installer.install(&package).await.unwrap_err();
        assert!(again.to_string().contains("already installed"));
    }

    #[tokio::test]
    async fn uninstall_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let package = write_package(tmp.path(), "notes", &[]);
        let installer = DirectoryInstaller::new(tmp.path().join("plugins"));
        let record = installer.install(&package).await.unwrap();

        installer.uninstall("notes").await.unwrap();
        assert!(!record.install_path.exists());
        assert!(installer.uninstall("notes").await.is_err());
    }

    #[tokio::test]
    async fn ids_cannot_escape_plugins_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let package = root.join("pkg");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(
            package.join(MANIFEST_FILE_NAME),
            r#"{"id":"../escaped","name":"Escaped","version":"1.0.0","main":"index.html"}"#,
        )
        .unwrap();
        std::fs::write(package.join("index.html"), "<html></html>").unwrap();
        let installer = DirectoryInstaller::new(root.join("plugins"));

        assert!(installer.install(&package).await.is_err());
        assert!(!root.join("escaped").exists());

        std::fs::create_dir_all(root.join("keep")).unwrap();
        assert!(installer.uninstall("../keep").await.is_err());
        assert!(root.join("keep").exists());
    }
}
