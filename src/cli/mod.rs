//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod cache;
pub mod common;
pub mod config;
pub mod resolve;
pub mod service;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slipway")]
#[command(version)]
#[command(
    about = "Resolve provider and service identifiers into managed instances",
    long_about = None
)]
struct Cli {
    /// Config file (default: ~/.slipway/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an identifier and print its descriptor
    Parse {
        /// Identifier (e.g. "npm:@acme/tts@1.2.0", "github:acme/tts#v2", "file:./tts")
        identifier: String,
    },
    /// Fetch, load and instantiate an identifier
    Resolve {
        /// Identifier to resolve
        identifier: String,
    },
    /// Manage a container-backed service
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Drop the cached artifact for an identifier so it is fetched again
    Refresh {
        /// Identifier to refresh
        identifier: String,
    },
    /// Inspect or clear the artifact cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ServiceAction {
    /// Start the service and wait until it is healthy
    Start {
        /// Service identifier
        identifier: String,
    },
    /// Stop the service (containers and volumes are kept)
    Stop {
        /// Service identifier
        identifier: String,
    },
    /// Stop then start the service
    Restart {
        /// Service identifier
        identifier: String,
    },
    /// Show live service status
    Status {
        /// Service identifier
        identifier: String,
    },
    /// Show container name, image, ports and health URL
    Info {
        /// Service identifier
        identifier: String,
    },
    /// Remove containers and volumes, release ports, delete fetched files
    Cleanup {
        /// Service identifier
        identifier: String,
    },
}

impl ServiceAction {
    fn identifier(&self) -> &str {
        match self {
            ServiceAction::Start { identifier }
            | ServiceAction::Stop { identifier }
            | ServiceAction::Restart { identifier }
            | ServiceAction::Status { identifier }
            | ServiceAction::Info { identifier }
            | ServiceAction::Cleanup { identifier } => identifier,
        }
    }
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Print the cache root directory
    Path,
    /// Delete every fetched artifact
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment overrides)
    Show,
    /// Check configuration for errors and warnings
    Check,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Fall back to defaults for logging if the config file is unreadable;
    // commands that need the config report the error themselves.
    let logging_cfg = common::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = slipway::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: could not initialize logging: {}", e);
    }

    let config_path = cli.config;
    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Parse { identifier }) => {
            resolve::cmd_parse(&identifier)?;
        }
        Some(Commands::Resolve { identifier }) => {
            resolve::cmd_resolve(config_path.as_deref(), &identifier).await?;
        }
        Some(Commands::Refresh { identifier }) => {
            resolve::cmd_refresh(config_path.as_deref(), &identifier).await?;
        }
        Some(Commands::Service { action }) => {
            service::cmd_service(config_path.as_deref(), action).await?;
        }
        Some(Commands::Cache { action }) => {
            cache::cmd_cache(config_path.as_deref(), action).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(config_path.as_deref(), action).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("slipway {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Resolve provider and service identifiers into managed instances");
}
