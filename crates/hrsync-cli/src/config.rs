//! CLI run settings from environment variables.

use anyhow::{Context, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Used when a run config does not set `batch_size`.
    pub batch_size: usize,
    /// Forces every run to be a dry run.
    pub dry_run: bool,
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            batch_size: std::env::var("HRSYNC_BATCH_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid HRSYNC_BATCH_SIZE")?,
            dry_run: std::env::var("HRSYNC_DRY_RUN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid HRSYNC_DRY_RUN")?,
        })
    }

    /// Fill `batch_size` when the run config leaves it out and force
    /// `dry_run` when either the settings or the command line ask for it.
    pub fn apply(&self, config: &mut Value, dry_run_flag: bool) -> Result<()> {
        let Value::Object(fields) = config else {
            anyhow::bail!("run config must be a JSON object");
        };
        fields
            .entry("batch_size")
            .or_insert_with(|| Value::from(self.batch_size));
        if self.dry_run || dry_run_flag {
            fields.insert("dry_run".to_string(), Value::Bool(true));
        }
        Ok(())
    }
}
