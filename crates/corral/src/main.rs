//! corral - remote app registry CLI
//!
//! Subcommands:
//! - `corral apps` - bootstrap the configured apps and list which came up
//! - `corral manifest <app>` - print an app's manifest
//! - `corral schema <app> <kind>` - print an app's input/output schema
//! - `corral call <app> <json>` - execute a request and print the result
//! - `corral config` - print the effective configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use corralconf::CorralConfig;
use corral::Registry;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "Remote app registry for generation pipelines")]
#[command(version)]
struct Cli {
    /// Config file (overrides ./corral.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// App id to bootstrap (repeatable; overrides the configured list)
    #[arg(long = "app")]
    apps: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the configured apps and list which came up
    Apps,

    /// Print an app's manifest
    Manifest {
        /// App id (URL authority, e.g. "app-one.example.net")
        app_id: String,
    },

    /// Print an app's input or output schema
    Schema {
        /// App id
        app_id: String,

        /// "input" or "output"
        kind: String,
    },

    /// Execute a request on an app and print the resolved result
    Call {
        /// App id
        app_id: String,

        /// JSON input document
        json: String,

        /// User id for the call (default from config)
        #[arg(short, long)]
        uid: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CorralConfig::load_from(cli.config.as_deref())?;

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let app_ids = if cli.apps.is_empty() {
        config.apps.clone()
    } else {
        cli.apps.clone()
    };
    let registry = Registry::initialize(&config.wire, &app_ids).await;

    let result = run(&cli.command, &registry).await;
    registry.shutdown().await;
    result
}

async fn run(command: &Commands, registry: &Registry) -> Result<()> {
    match command {
        Commands::Apps => {
            for app_id in registry.apps() {
                println!("{}", app_id);
            }
        }

        Commands::Manifest { app_id } => {
            println!("{}", serde_json::to_string_pretty(&registry.manifest(app_id))?);
        }

        Commands::Schema { app_id, kind } => {
            let schema = registry.schema(app_id, kind)?;
            println!("{}", serde_json::to_string_pretty(schema)?);
        }

        Commands::Call { app_id, json, uid } => {
            let data: serde_json::Value = serde_json::from_str(json)?;
            let result = registry.call(app_id, data, uid.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Config => unreachable!("handled before bootstrap"),
    }

    Ok(())
}
