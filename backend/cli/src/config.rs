//! Config file location and the mapping from [`HostConfig`] onto the
//! settings each component takes.

use std::path::{Path, PathBuf};

use plughost_config::{config_dir, config_file_path, HostConfig};
use plughost_plugins::DevLoaderSettings;
use plughost_workspace::ScannerSettings;

/// Where the config file lives and the directory relative paths hang off.
#[derive(Debug, Clone)]
pub struct ConfigLocation {
    pub dir: PathBuf,
    pub file: PathBuf,
}

impl ConfigLocation {
    /// `--config FILE` wins; otherwise `PLUGHOST_CONFIG_DIR` or `~/.plughost`.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(file) => {
                let dir = file
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Self { dir, file }
            }
            None => {
                let dir = config_dir();
                let file = config_file_path(&dir);
                Self { dir, file }
            }
        }
    }

    pub fn plugins_dir(&self, config: &HostConfig) -> PathBuf {
        config.plugins.dir(&self.dir)
    }
}

pub fn loader_settings(config: &HostConfig) -> DevLoaderSettings {
    DevLoaderSettings {
        development_mode: config.loader.development_mode(),
        debounce: config.loader.debounce(),
        dev_host: config.loader.dev_host().to_string(),
        dev_port_base: config.loader.dev_port_base(),
        dev_port_span: config.loader.dev_port_span(),
        watch_extensions: config.loader.watch_extensions(),
        ignored_dirs: config.workspace.ignored_dirs(),
    }
}

pub fn scanner_settings(config: &HostConfig) -> ScannerSettings {
    let ws = &config.workspace;
    ScannerSettings {
        descriptor_file: ws.descriptor_file().to_string(),
        settle_delay: ws.settle_delay(),
        debounce: ws.debounce(),
        probe_span: ws.probe_span(),
        source_extensions: ws.source_extensions(),
        ignored_dirs: ws.ignored_dirs(),
        dev_host: ws.dev_host().to_string(),
    }
}
