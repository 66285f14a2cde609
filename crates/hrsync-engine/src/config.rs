//! JSON run configurations and their execution against a connector registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hrsync_connectors::{Connector, ConnectorRegistry};
use hrsync_core::{Condition, Cursor, NativeRecord, Resource, Result, SyncError, UnifiedEvent};

use crate::formatter::{FormatterStore, MappingFormatter, MappingSpec};
use crate::pull::{PullJob, DEFAULT_BATCH_SIZE};
use crate::push::{PushInput, PushJob, PushMode, PushResult};

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_ignore_missing() -> bool {
    true
}

/// A pull run.
///
/// ```json
/// {"origin": "warehouse_a", "target": "hrflow", "resource": "job",
///  "cursor": {"mode": "updated_at"},
///  "where": [{"field": "board_key", "op": "in", "value": ["b1"]}],
///  "having": [], "batch_size": 500}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    pub origin: String,
    pub target: String,
    pub resource: Resource,
    pub cursor: Cursor,
    #[serde(default, rename = "where")]
    pub prefilters: Vec<Condition>,
    #[serde(default, rename = "having")]
    pub postfilters: Vec<Condition>,
    #[serde(default)]
    pub formatter_id: Option<String>,
    /// Inline alternative to `formatter_id`.
    #[serde(default)]
    pub mapping: Vec<MappingSpec>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
}

/// A push run. `events` are raw webhook payloads, interpreted by the origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub origin: String,
    pub target: String,
    pub resource: Resource,
    pub mode: PushMode,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default)]
    pub resources: Vec<NativeRecord>,
    #[serde(default, rename = "having")]
    pub postfilters: Vec<Condition>,
    #[serde(default)]
    pub formatter_id: Option<String>,
    #[serde(default)]
    pub mapping: Vec<MappingSpec>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_ignore_missing")]
    pub ignore_missing: bool,
}

async fn resolve_formatter(
    formatter_id: Option<&str>,
    mapping: &[MappingSpec],
    formatters: &FormatterStore,
) -> Result<Option<MappingFormatter>> {
    match (formatter_id, mapping.is_empty()) {
        (Some(_), false) => Err(SyncError::configuration(
            "set either formatter_id or mapping, not both",
        )),
        (Some(id), true) => formatters.build(id).await.map(Some),
        (None, false) => Ok(Some(MappingFormatter::new(mapping.to_vec()))),
        (None, true) => Ok(None),
    }
}

/// Turn raw payloads into events for `resource`. A payload the origin does
/// not recognize is a validation error.
pub fn parse_events(
    origin: &dyn Connector,
    resource: Resource,
    raw: &[Value],
) -> Result<Vec<UnifiedEvent>> {
    raw.iter()
        .enumerate()
        .map(|(index, payload)| {
            origin.parse_event(resource, payload)?.ok_or_else(|| {
                SyncError::validation(format!(
                    "event #{} is not a {} event for connector {}",
                    index,
                    resource,
                    origin.name()
                ))
            })
        })
        .collect()
}

pub async fn run_pull(
    config: &PullConfig,
    registry: &ConnectorRegistry,
    formatters: &FormatterStore,
) -> Result<Cursor> {
    let origin = registry.get(&config.origin).await?;
    let target = registry.get(&config.target).await?;
    let formatter =
        resolve_formatter(config.formatter_id.as_deref(), &config.mapping, formatters).await?;

    let mut job = PullJob::new(config.resource, origin.as_ref(), target.as_ref())
        .prefilters(config.prefilters.clone())
        .postfilters(config.postfilters.clone())
        .batch_size(config.batch_size)
        .dry_run(config.dry_run);
    if let Some(formatter) = &formatter {
        job = job.formatter(formatter);
    }
    job.run(&config.cursor).await
}

pub async fn run_push(
    config: &PushConfig,
    registry: &ConnectorRegistry,
    formatters: &FormatterStore,
) -> Result<PushResult> {
    let origin = registry.get(&config.origin).await?;
    let target = registry.get(&config.target).await?;
    let formatter =
        resolve_formatter(config.formatter_id.as_deref(), &config.mapping, formatters).await?;

    let input = match config.mode {
        PushMode::Events => PushInput::Events(parse_events(
            origin.as_ref(),
            config.resource,
            &config.events,
        )?),
        PushMode::Resources => PushInput::Resources(config.resources.clone()),
    };

    let mut job = PushJob::new(config.resource, origin.as_ref(), target.as_ref())
        .postfilters(config.postfilters.clone())
        .batch_size(config.batch_size)
        .dry_run(config.dry_run)
        .ignore_missing(config.ignore_missing);
    if let Some(formatter) = &formatter {
        job = job.formatter(formatter);
    }
    job.run(input).await
}
