mod config;
mod doctor_cmd;
mod host;
mod inspect_cmd;
mod plugins_cmd;
mod serve_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use plughost_config::{load_and_prepare, write_config, HostConfig};
use tracing::info;

use config::ConfigLocation;
use plugins_cmd::PluginsCommand;

#[derive(Parser)]
#[command(name = "plughost")]
#[command(about = "plughost: desktop plugin host with workspace auto-discovery")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.plughost/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the plugin host and auto-discover workspace projects
    Serve {
        /// Workspace root to scan (overrides workspace.root)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Show which projects under a directory have a live dev server
    Scan {
        /// A project directory or a workspace root
        dir: PathBuf,
    },
    /// Check whether a dev server is listening near a port
    Probe {
        port: u16,
        /// How many ports above PORT to try
        #[arg(long, default_value_t = 0)]
        span: u16,
    },
    /// Manage installed plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
    /// Validate the config and report the resolved settings
    Doctor,
    /// Write a config file with every default filled in
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let location = ConfigLocation::resolve(cli.config);
    let config = load_and_prepare(&location.file).await?;

    plughost_logging::init_logger(config.logging.dir.as_deref(), config.logging.level());

    match cli.command {
        Commands::Serve { workspace } => {
            info!(config = %location.file.display(), "Starting plughost");
            serve_cmd::run(config, location, workspace).await?;
        }
        Commands::Scan { dir } => inspect_cmd::scan(&config, &dir).await?,
        Commands::Probe { port, span } => inspect_cmd::probe(port, span).await?,
        Commands::Plugins { command } => plugins_cmd::run(config, location, command).await?,
        Commands::Doctor => doctor_cmd::run(&config, &location).await?,
        Commands::Init { force } => init(&location, force).await?,
    }

    Ok(())
}

async fn init(location: &ConfigLocation, force: bool) -> Result<()> {
    if location.file.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", location.file.display());
    }
    let config = plughost_config::apply_all_defaults(HostConfig::default());
    write_config(&config, &location.file).await?;
    println!("Wrote {}", location.file.display());
    Ok(())
}
