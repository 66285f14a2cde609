//! hrsync server - REST API for pull and push runs

mod api;
mod config;

use anyhow::Context;
use hrsync_connectors::{ConnectorRegistry, HrflowConfig, HrflowFactory, WarehouseAFactory};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{router, AppState};
use crate::config::ServerConfig;

/// Register one Warehouse A connector per `<name>.json` file in `dir`.
fn register_store_dir(registry: &mut ConnectorRegistry, dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data dir {}", dir.display()))?;
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        registry.register(Arc::new(WarehouseAFactory::with_file(name, &path)));
        count += 1;
    }
    Ok(count)
}

fn build_registry(config: &ServerConfig) -> anyhow::Result<ConnectorRegistry> {
    let mut registry = ConnectorRegistry::new();
    match &config.data_dir {
        Some(dir) => {
            let count = register_store_dir(&mut registry, dir)?;
            info!("Registered {} store(s) from {}", count, dir.display());
        }
        None => {
            registry.register(Arc::new(WarehouseAFactory::in_memory("warehouse_a")));
            info!("HRSYNC_DATA_DIR not set. Using an in-memory warehouse_a.");
        }
    }
    match HrflowConfig::from_env() {
        Ok(hrflow) => {
            registry.register(Arc::new(HrflowFactory::new("hrflow", hrflow)));
            info!("Registered HrFlow connector");
        }
        Err(e) => info!("HrFlow connector not registered: {}", e),
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::new(build_registry(&config)?));

    let app = router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    info!("Starting hrsync server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
