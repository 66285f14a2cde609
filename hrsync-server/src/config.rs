//! Server configuration from environment variables.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory of Warehouse A store files; each `<name>.json` becomes a
    /// connector called `<name>`. None = a single in-memory `warehouse_a`.
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: std::env::var("HRSYNC_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
                .parse()
                .context("Invalid HRSYNC_BIND_ADDR")?,
            data_dir: std::env::var("HRSYNC_DATA_DIR").ok().map(PathBuf::from),
        })
    }
}
