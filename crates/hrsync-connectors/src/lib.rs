//! hrsync connectors - the connector contract and its implementations
//!
//! This crate provides:
//! - the `Connector` trait the pull and push engines drive
//! - an explicit `ConnectorRegistry` of named connector factories
//! - `InMemoryStore`, a paged record store with JSON file persistence
//! - `warehouse_a`, a job board backed by the in-memory store
//! - `hrflow`, an HTTP connector whose native schema is the unified schema

pub mod auth;
pub mod error;
pub mod factory;
pub mod hrflow;
pub mod memory;
pub mod warehouse_a;

pub use auth::HttpAuth;
pub use error::ConnectorError;
pub use factory::{ConnectorFactory, ConnectorMeta, ConnectorRegistry};
pub use hrflow::{HrflowConfig, HrflowConnector, HrflowFactory};
pub use memory::InMemoryStore;
pub use warehouse_a::{WarehouseAConnector, WarehouseAFactory};

use async_trait::async_trait;
use serde_json::Value;

use hrsync_core::{
    Condition, Cursor, CursorMode, NativeRecord, NativeSchema, Resource, Result, SyncError,
    UnifiedEvent, UnifiedRecord, WarehouseType,
};

/// One page of native records and the position of the page after it.
///
/// `next = None` means there is nothing further to read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBatch {
    pub records: Vec<NativeRecord>,
    pub next: Option<String>,
}

impl ReadBatch {
    pub fn new(records: Vec<NativeRecord>, next: Option<String>) -> Self {
        Self { records, next }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// An external system holding jobs and profiles.
///
/// Implementations are shared across tasks behind `Arc<dyn Connector>`; all
/// I/O methods are awaited one at a time by the engines.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn warehouse_type(&self) -> WarehouseType;

    /// Binding table of the native record type for `resource`.
    fn schema(&self, resource: Resource) -> Result<&'static NativeSchema>;

    /// Read one page at `cursor.start`, with `prefilters` pushed down.
    async fn read_batch(
        &self,
        resource: Resource,
        prefilters: &[Condition],
        cursor: &Cursor,
        batch_size: usize,
    ) -> Result<ReadBatch>;

    /// Upsert native records.
    async fn write_native_batch(&self, resource: Resource, records: Vec<NativeRecord>)
        -> Result<()>;

    /// Upsert unified records, converting each with [`Connector::from_unified`].
    async fn write_unified_batch(
        &self,
        resource: Resource,
        records: Vec<UnifiedRecord>,
    ) -> Result<()> {
        let natives = records
            .into_iter()
            .map(|r| self.from_unified(resource, r))
            .collect::<Result<Vec<_>>>()?;
        self.write_native_batch(resource, natives).await
    }

    /// The record's id, read from the field bound to the `id` cursor mode.
    fn get_id(&self, resource: Resource, record: &NativeRecord) -> Result<String> {
        self.extract_cursor(resource, record, CursorMode::Id)?
            .ok_or_else(|| {
                SyncError::format(format!("{} {} record has no id", self.name(), resource))
            })
    }

    fn extract_cursor(
        &self,
        resource: Resource,
        record: &NativeRecord,
        mode: CursorMode,
    ) -> Result<Option<String>> {
        hrsync_core::extract_cursor(record, self.schema(resource)?, mode)
    }

    /// Fetch the records referenced by events. Ids that no longer exist are
    /// simply absent from the result.
    async fn fetch_by_event_ids(
        &self,
        resource: Resource,
        ids: &[String],
    ) -> Result<Vec<NativeRecord>>;

    fn to_unified(&self, resource: Resource, record: &NativeRecord) -> Result<UnifiedRecord>;

    fn from_unified(&self, resource: Resource, unified: UnifiedRecord) -> Result<NativeRecord>;

    /// Interpret a raw webhook payload. `None` when the payload is not an
    /// event for `resource`.
    fn parse_event(&self, _resource: Resource, _raw: &Value) -> Result<Option<UnifiedEvent>> {
        Ok(None)
    }
}
