//! `plughost serve`: run the host until interrupted.
//!
//! Requests arrive on stdin one JSON object per line and replies are written
//! to stdout in order. Closing stdin does not stop the host.

use std::path::PathBuf;

use anyhow::Result;
use plughost_config::HostConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::ConfigLocation;
use crate::host::Host;

pub async fn run(config: HostConfig, location: ConfigLocation, workspace: Option<PathBuf>) -> Result<()> {
    let host = Host::build(&config, &location).await?;

    match workspace.or_else(|| config.workspace.root.clone()) {
        Some(root) => match host.start_workspace(&root).await {
            Ok(registered) => info!(root = %root.display(), ?registered, "Workspace loaded"),
            Err(e) => warn!(root = %root.display(), error = %e, "Workspace discovery unavailable"),
        },
        None => info!("No workspace root configured; auto-discovery is off"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received; shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => println!("{}", host.handle_line(&line).await),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Request stream failed; no longer reading stdin");
                    stdin_open = false;
                }
            },
        }
    }

    host.shutdown().await;
    Ok(())
}
