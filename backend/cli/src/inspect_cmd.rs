//! `plughost scan` and `plughost probe`: one-shot discovery diagnostics.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use plughost_config::HostConfig;
use plughost_core::headless::{HeadlessSandbox, InMemoryBridge, StaticWindowDirectory};
use plughost_plugins::{PluginDevLoader, PluginWebviewManager};
use plughost_workspace::{find_running_port, is_port_in_use, ProjectConfig, TcpPortProbe, WorkspaceScanner};

use crate::config::{loader_settings, scanner_settings};

/// Print what the scanner would register for `dir`, without registering it.
///
/// `dir` may be a single project or a workspace root.
pub async fn scan(config: &HostConfig, dir: &Path) -> Result<()> {
    let scanner = detached_scanner(config);
    let mut found: Vec<ProjectConfig> = Vec::new();

    if let Some(project) = scanner.inspect_project(dir).await? {
        found.push(project);
    } else {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        for project_dir in dirs {
            match scanner.inspect_project(&project_dir).await {
                Ok(Some(project)) => found.push(project),
                Ok(None) => {}
                Err(e) => eprintln!("skipping {}: {e}", project_dir.display()),
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}

/// Report the first live server in `port ..= port + span`.
pub async fn probe(port: u16, span: u16) -> Result<()> {
    let probe = TcpPortProbe::default();
    if span == 0 {
        let busy = is_port_in_use(&probe, port).await;
        println!("port {port}: {}", if busy { "in use" } else { "free" });
        return Ok(());
    }
    match find_running_port(&probe, port, span, "probe").await {
        Some(found) => println!("dev server listening on {found}"),
        None => bail!("nothing listening on ports {port}..={}", port.saturating_add(span)),
    }
    Ok(())
}

fn detached_scanner(config: &HostConfig) -> WorkspaceScanner {
    let loader = PluginDevLoader::new(
        Arc::new(HeadlessSandbox::new()),
        Arc::new(InMemoryBridge::new()),
        loader_settings(config),
    );
    let webview = PluginWebviewManager::new(
        Arc::new(StaticWindowDirectory::new()),
        config.webview.host_window_url(),
    );
    WorkspaceScanner::new(loader, webview, Arc::new(TcpPortProbe::default()), scanner_settings(config))
}
