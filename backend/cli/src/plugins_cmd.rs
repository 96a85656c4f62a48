//! `plughost plugins ...`: manage the installed plugin directory.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Subcommand;
use plughost_config::HostConfig;
use plughost_core::OpResult;

use crate::config::ConfigLocation;
use crate::host::Host;

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// Install a plugin package directory
    Install {
        /// Directory containing manifest.json
        path: PathBuf,
    },
    /// Remove an installed plugin
    Uninstall { id: String },
    /// List installed plugins
    List,
}

pub async fn run(config: HostConfig, location: ConfigLocation, command: PluginsCommand) -> Result<()> {
    let host = Host::build(&config, &location).await?;
    match command {
        PluginsCommand::Install { path } => report(host.manager.install_plugin(&path).await),
        PluginsCommand::Uninstall { id } => report(host.manager.uninstall_plugin(&id).await),
        PluginsCommand::List => {
            let records = host.manager.list_plugins().await;
            if records.is_empty() {
                println!("No plugins installed in {}", location.plugins_dir(&config).display());
            }
            for r in records {
                let state = if r.enabled { "enabled" } else { "disabled" };
                println!("{:<24} {:<10} {:<9} {}", r.id, r.version, state, r.install_path.display());
            }
            Ok(())
        }
    }
}

fn report(res: OpResult) -> Result<()> {
    if !res.success {
        bail!(res.message);
    }
    println!("{}", res.message);
    Ok(())
}
