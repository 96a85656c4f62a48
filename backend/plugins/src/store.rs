/// In-memory plugin store, optionally seeded from the plugins directory.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plughost_core::{PluginRecord, PluginStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::manifest::load_manifest;

#[derive(Default)]
pub struct MemoryPluginStore {
    records: RwLock<HashMap<String, PluginRecord>>,
}

impl MemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every valid plugin package found directly under `plugins_dir`.
    ///
    /// Directories without a valid manifest are skipped with a warning.
    pub async fn discover(&self, plugins_dir: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(plugins_dir).await.unwrap_or(false) {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = tokio::fs::read_dir(plugins_dir)
            .await
            .context("read plugins dir")?;
        while let Some(entry) = entries.next_entry().await? {
            let plugin_path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match load_manifest(&plugin_path).await {
                Ok(manifest) => {
                    info!(plugin = %manifest.id, version = %manifest.version, "Discovered installed plugin");
                    let installed_at = entry
                        .metadata()
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(Utc::now);
                    self.records.write().await.insert(
                        manifest.id.clone(),
                        PluginRecord {
                            id: manifest.id,
                            name: manifest.name,
                            version: manifest.version,
                            install_path: plugin_path,
                            enabled: true,
                            installed_at,
                        },
                    );
                    count += 1;
                }
                Err(e) => {
                    warn!(dir = ?entry.file_name(), error = %e, "Skipping plugin directory");
                }
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn get_plugin_record(&self, id: &str) -> Result<Option<PluginRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        match self.records.write().await.get_mut(id) {
            Some(record) => {
                record.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_record(&self, record: PluginRecord) -> Result<()> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove_record(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list_records(&self) -> Result<Vec<PluginRecord>> {
        let mut records: Vec<PluginRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::tests::write_package;

    #[tokio::test]
    async fn discover_skips_directories_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let plugins = tmp.path().join("plugins");
        std::fs::create_dir_all(plugins.join("broken")).unwrap();
        let package = write_package(tmp.path(), "notes", &["storage"]);
        std::fs::rename(&package, plugins.join("notes")).unwrap();

        let store = MemoryPluginStore::new();
        assert_eq!(store.discover(&plugins).await.unwrap(), 1);
        let record = store.get_plugin_record("notes").await.unwrap().unwrap();
        assert_eq!(record.install_path, plugins.join("notes"));
        assert!(record.enabled);
    }

    #[tokio::test]
    async fn discover_of_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryPluginStore::new();
        assert_eq!(store.discover(&tmp.path().join("nope")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_enabled_reports_unknown_ids() {
        let store = MemoryPluginStore::new();
        assert!(!store.set_enabled("ghost", false).await.unwrap());
        assert!(!store.remove_record("ghost").await.unwrap());
    }
}
