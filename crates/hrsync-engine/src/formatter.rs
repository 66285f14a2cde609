//! Formatter resolution: explicit formatter output or the unified fallback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use hrsync_connectors::Connector;
use hrsync_core::{NativeRecord, NativeSchema, Resource, Result, SyncError, UnifiedRecord};

/// What a formatter produced for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatOutput {
    /// Already in the target's native shape.
    Native(NativeRecord),
    /// Flat `field -> value` pairs, assigned onto the target schema.
    Mapping(Map<String, Value>),
}

/// A user-supplied transform from an origin-native record to the target.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &NativeRecord) -> Result<FormatOutput>;
}

impl<F> Formatter for F
where
    F: Fn(&NativeRecord) -> Result<FormatOutput> + Send + Sync,
{
    fn format(&self, record: &NativeRecord) -> Result<FormatOutput> {
        self(record)
    }
}

// ---------------------------------------------------------------------------
// Mapping formatter
// ---------------------------------------------------------------------------

/// One `from -> to` field copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSpec {
    /// Dotted path on the origin record.
    pub from: String,
    /// Field on the target record.
    pub to: String,
}

impl MappingSpec {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Copies fields by name. A source path that does not resolve yields `null`.
#[derive(Debug, Clone)]
pub struct MappingFormatter {
    mapping: Vec<MappingSpec>,
}

impl MappingFormatter {
    pub fn new(mapping: Vec<MappingSpec>) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &[MappingSpec] {
        &self.mapping
    }
}

impl Formatter for MappingFormatter {
    fn format(&self, record: &NativeRecord) -> Result<FormatOutput> {
        let mut out = Map::new();
        for spec in &self.mapping {
            let value = record.lookup(&spec.from).cloned().unwrap_or(Value::Null);
            out.insert(spec.to.clone(), value);
        }
        Ok(FormatOutput::Mapping(out))
    }
}

/// Mapping specs registered through the API, addressed by generated id.
#[derive(Default)]
pub struct FormatterStore {
    specs: RwLock<HashMap<String, Vec<MappingSpec>>>,
}

impl FormatterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `mapping` and return its new id.
    pub async fn insert(&self, mapping: Vec<MappingSpec>) -> String {
        let id = Uuid::new_v4().to_string();
        self.specs.write().await.insert(id.clone(), mapping);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Vec<MappingSpec>> {
        self.specs.read().await.get(id).cloned()
    }

    /// Build the formatter registered under `id`.
    pub async fn build(&self, id: &str) -> Result<MappingFormatter> {
        self.get(id)
            .await
            .map(MappingFormatter::new)
            .ok_or_else(|| SyncError::configuration(format!("unknown formatter id '{}'", id)))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// A formatted batch, tagged with the write entry point it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum FormattedBatch {
    Native(Vec<NativeRecord>),
    Unified(Vec<UnifiedRecord>),
}

impl FormattedBatch {
    pub fn len(&self) -> usize {
        match self {
            FormattedBatch::Native(records) => records.len(),
            FormattedBatch::Unified(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a target-native record from flat pairs. Keys the target schema
/// does not declare are rejected.
pub fn assign_mapping(schema: &NativeSchema, mapping: Map<String, Value>) -> Result<NativeRecord> {
    let mut record = NativeRecord::new();
    for (field, value) in mapping {
        if !schema.has_field(&field) {
            return Err(SyncError::format(format!(
                "{} has no field '{}'",
                schema.name, field
            )));
        }
        record.insert(field, value);
    }
    Ok(record)
}

/// Format `records` for `target`. With a formatter every record goes through
/// it; without one each record is converted to the unified model by `origin`.
/// The first failing record fails the whole batch.
pub fn format_batch(
    resource: Resource,
    origin: &dyn Connector,
    target: &dyn Connector,
    formatter: Option<&dyn Formatter>,
    records: &[NativeRecord],
) -> Result<FormattedBatch> {
    match formatter {
        Some(formatter) => {
            let schema = target.schema(resource)?;
            let natives = records
                .iter()
                .map(|record| match formatter.format(record)? {
                    FormatOutput::Native(native) => Ok(native),
                    FormatOutput::Mapping(mapping) => assign_mapping(schema, mapping),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FormattedBatch::Native(natives))
        }
        None => {
            let unified = records
                .iter()
                .map(|record| origin.to_unified(resource, record))
                .collect::<Result<Vec<_>>>()?;
            Ok(FormattedBatch::Unified(unified))
        }
    }
}

/// Write through the entry point matching the batch's tag.
pub async fn write_formatted(
    target: &dyn Connector,
    resource: Resource,
    batch: FormattedBatch,
) -> Result<()> {
    match batch {
        FormattedBatch::Native(records) => target.write_native_batch(resource, records).await,
        FormattedBatch::Unified(records) => target.write_unified_batch(resource, records).await,
    }
}

/// Format `records` and, unless `dry_run`, write them to `target`. Returns
/// how many records were (or would have been) written.
pub(crate) async fn deliver(
    resource: Resource,
    origin: &dyn Connector,
    target: &dyn Connector,
    formatter: Option<&dyn Formatter>,
    records: &[NativeRecord],
    dry_run: bool,
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let batch = format_batch(resource, origin, target, formatter, records)?;
    let count = batch.len();
    if !dry_run {
        write_formatted(target, resource, batch).await?;
    }
    Ok(count)
}
