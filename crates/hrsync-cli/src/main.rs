//! hrsync CLI - run pulls and pushes between HR systems

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hrsync_connectors::{ConnectorRegistry, HrflowConfig, HrflowFactory, WarehouseAFactory};
use hrsync_core::{unified_schema, Resource};
use hrsync_engine::{run_pull, run_push, FormatterStore, PullConfig, PushConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::SyncSettings;

#[derive(Parser)]
#[command(name = "hrsync")]
#[command(about = "Synchronize jobs and profiles between HR systems")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Register a Warehouse A connector backed by a JSON file (NAME=PATH)
    #[arg(long = "store", value_parser = parse_store, global = true)]
    stores: Vec<(String, PathBuf)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered connectors
    Connectors,

    /// Show the fields of a connector's native schema
    Schema {
        /// Connector name, or "unified"
        connector: String,

        /// job or profile
        resource: Resource,

        /// Only fields that accept prefilters
        #[arg(long)]
        prefilterable: bool,
    },

    /// Run a pull from a JSON config file and print the resulting cursor
    Pull {
        #[arg(short, long)]
        config: PathBuf,

        /// Read and format without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a push from a JSON config file and print the result
    Push {
        #[arg(short, long)]
        config: PathBuf,

        /// Fetch and format without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_store(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", raw)),
    }
}

fn build_registry(stores: &[(String, PathBuf)]) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    for (name, path) in stores {
        registry.register(Arc::new(WarehouseAFactory::with_file(name, path)));
    }
    match HrflowConfig::from_env() {
        Ok(hrflow) => {
            registry.register(Arc::new(HrflowFactory::new("hrflow", hrflow)));
        }
        Err(e) => debug!("HrFlow connector not registered: {:#}", e),
    }
    registry
}

fn load_run_config<T: DeserializeOwned>(
    path: &Path,
    settings: &SyncSettings,
    dry_run: bool,
) -> Result<T> {
    info!("Loading run config from {:?}", path);
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    settings.apply(&mut raw, dry_run)?;
    serde_json::from_value(raw).with_context(|| format!("Invalid run config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = build_registry(&cli.stores);

    match cli.command {
        Commands::Connectors => {
            println!("{}", serde_json::to_string_pretty(&registry.list())?);
        }
        Commands::Schema {
            connector,
            resource,
            prefilterable,
        } => {
            let schema = if connector == "unified" {
                unified_schema(resource)
            } else {
                registry.get(&connector).await?.schema(resource)?
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&schema.describe(prefilterable))?
            );
        }
        Commands::Pull { config, dry_run } => {
            let settings = SyncSettings::from_env()?;
            let pull: PullConfig = load_run_config(&config, &settings, dry_run)?;
            let cursor = run_pull(&pull, &registry, &FormatterStore::new()).await?;
            println!("{}", serde_json::to_string_pretty(&cursor)?);
        }
        Commands::Push { config, dry_run } => {
            let settings = SyncSettings::from_env()?;
            let push: PushConfig = load_run_config(&config, &settings, dry_run)?;
            let result = run_push(&push, &registry, &FormatterStore::new()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.errors.is_empty() {
                eprintln!("Push finished with {} error(s):", result.errors.len());
                for error in &result.errors {
                    eprintln!("  - {}", error);
                }
            }
        }
    }

    Ok(())
}
