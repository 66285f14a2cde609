//! Warehouse A: a job board whose records live in an [`InMemoryStore`],
//! optionally persisted to a JSON file after every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use hrsync_core::models::ProfileInfo;
use hrsync_core::{
    Binding, BoolJoin, Condition, Cursor, CursorBinding, CursorMode, EventKind, FieldSpec,
    InclusionBinding, ListEncoding, NativeRecord, NativeSchema, Operator, Resource, Result,
    SearchBinding, SyncError, UnifiedEvent, UnifiedJob, UnifiedProfile, UnifiedRecord,
    WarehouseType,
};

use crate::factory::{ConnectorFactory, ConnectorMeta};
use crate::memory::InMemoryStore;
use crate::{Connector, ReadBatch};

// ---------------------------------------------------------------------------
// Native models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseAJob {
    pub job_id: String,
    pub job_title: String,
    #[serde(default)]
    pub board_key: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseAProfile {
    pub profile_id: String,
    pub full_name: String,
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub updated_time: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

const ORDER_ASC: &str = "asc";
const ORDER_DESC: &str = "desc";

const fn cursor(mode: CursorMode, start_param: &'static str, end_param: &'static str) -> Binding {
    Binding::Cursor(CursorBinding {
        mode,
        start_param,
        end_param,
        order_asc: ORDER_ASC,
        order_desc: ORDER_DESC,
    })
}

const RANGE_OPS: &[Operator] = &[Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte];

const TEXT_SEARCH: Binding = Binding::Search(SearchBinding {
    param: "q",
    value_join: BoolJoin::Or,
    field_join: BoolJoin::And,
});

static JOB_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "job_id",
        prefilter_ops: &[Operator::Eq, Operator::In],
        bindings: &[cursor(CursorMode::Id, "id_after", "id_before")],
    },
    FieldSpec {
        name: "job_title",
        prefilter_ops: &[Operator::Eq, Operator::Contains],
        bindings: &[TEXT_SEARCH],
    },
    FieldSpec {
        name: "board_key",
        prefilter_ops: &[Operator::Eq, Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "board_keys",
            encoding: ListEncoding::Csv,
        })],
    },
    FieldSpec {
        name: "last_modified",
        prefilter_ops: RANGE_OPS,
        bindings: &[cursor(CursorMode::UpdatedAt, "updated_after", "updated_before")],
    },
    FieldSpec {
        name: "created_on",
        prefilter_ops: RANGE_OPS,
        bindings: &[cursor(CursorMode::CreatedAt, "created_after", "created_before")],
    },
    FieldSpec {
        name: "payload",
        prefilter_ops: &[],
        bindings: &[],
    },
];

static PROFILE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "profile_id",
        prefilter_ops: &[Operator::Eq, Operator::In],
        bindings: &[cursor(CursorMode::Id, "id_after", "id_before")],
    },
    FieldSpec {
        name: "full_name",
        prefilter_ops: &[Operator::Eq, Operator::Contains],
        bindings: &[TEXT_SEARCH],
    },
    FieldSpec {
        name: "source_key",
        prefilter_ops: &[Operator::Eq, Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "source_keys",
            encoding: ListEncoding::Csv,
        })],
    },
    FieldSpec {
        name: "updated_time",
        prefilter_ops: RANGE_OPS,
        bindings: &[cursor(CursorMode::UpdatedAt, "updated_after", "updated_before")],
    },
    FieldSpec {
        name: "created_time",
        prefilter_ops: RANGE_OPS,
        bindings: &[cursor(CursorMode::CreatedAt, "created_after", "created_before")],
    },
    FieldSpec {
        name: "payload",
        prefilter_ops: &[],
        bindings: &[],
    },
];

pub static WAREHOUSE_A_JOB_SCHEMA: NativeSchema = NativeSchema {
    name: "WarehouseAJob",
    fields: JOB_FIELDS,
    sort_param: Some("sort"),
};

pub static WAREHOUSE_A_PROFILE_SCHEMA: NativeSchema = NativeSchema {
    name: "WarehouseAProfile",
    fields: PROFILE_FIELDS,
    sort_param: Some("sort"),
};

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct WarehouseAConnector {
    name: String,
    store: Arc<InMemoryStore>,
    persist_to: Option<PathBuf>,
}

impl WarehouseAConnector {
    pub fn new(name: impl Into<String>, store: Arc<InMemoryStore>) -> Self {
        Self {
            name: name.into(),
            store,
            persist_to: None,
        }
    }

    /// Save the store to `path` after every write.
    pub fn persisted_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_to = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    fn job_to_unified(&self, job: WarehouseAJob) -> UnifiedJob {
        UnifiedJob {
            id: Some(job.job_id.clone()),
            origin: self.name.clone(),
            key: job.job_id,
            board_key: job.board_key.unwrap_or_default(),
            name: job.job_title,
            created_at: job.created_on,
            updated_at: job.last_modified,
            payload: Some(Value::Object(job.payload)),
            ..Default::default()
        }
    }

    fn profile_to_unified(&self, profile: WarehouseAProfile) -> UnifiedProfile {
        UnifiedProfile {
            id: Some(profile.profile_id.clone()),
            origin: self.name.clone(),
            key: profile.profile_id,
            source_key: profile.source_key.unwrap_or_default(),
            info: ProfileInfo {
                full_name: Some(profile.full_name),
                ..Default::default()
            },
            created_at: profile.created_time,
            updated_at: profile.updated_time,
            payload: Some(Value::Object(profile.payload)),
            ..Default::default()
        }
    }
}

fn native_id(key: String, id: Option<String>) -> Result<String> {
    if !key.is_empty() {
        return Ok(key);
    }
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::format("unified record has neither key nor id"))
}

fn payload_object(payload: Option<Value>) -> Map<String, Value> {
    match payload {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
        None => Map::new(),
    }
}

#[async_trait]
impl Connector for WarehouseAConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Jobboard
    }

    fn schema(&self, resource: Resource) -> Result<&'static NativeSchema> {
        Ok(match resource {
            Resource::Job => &WAREHOUSE_A_JOB_SCHEMA,
            Resource::Profile => &WAREHOUSE_A_PROFILE_SCHEMA,
        })
    }

    async fn read_batch(
        &self,
        resource: Resource,
        prefilters: &[Condition],
        cursor: &Cursor,
        batch_size: usize,
    ) -> Result<ReadBatch> {
        let schema = self.schema(resource)?;
        self.store
            .page(schema, resource, prefilters, cursor, batch_size)
            .await
    }

    async fn write_native_batch(
        &self,
        resource: Resource,
        records: Vec<NativeRecord>,
    ) -> Result<()> {
        let count = records.len();
        self.store
            .upsert(self.schema(resource)?, resource, records)
            .await?;
        if let Some(path) = &self.persist_to {
            self.store.save(path).await?;
        }
        debug!(connector = %self.name, %resource, count, "upserted records");
        Ok(())
    }

    async fn fetch_by_event_ids(
        &self,
        resource: Resource,
        ids: &[String],
    ) -> Result<Vec<NativeRecord>> {
        self.store
            .get_many(self.schema(resource)?, resource, ids)
            .await
    }

    fn to_unified(&self, resource: Resource, record: &NativeRecord) -> Result<UnifiedRecord> {
        Ok(match resource {
            Resource::Job => UnifiedRecord::Job(self.job_to_unified(record.to_model()?)),
            Resource::Profile => {
                UnifiedRecord::Profile(self.profile_to_unified(record.to_model()?))
            }
        })
    }

    fn from_unified(&self, resource: Resource, unified: UnifiedRecord) -> Result<NativeRecord> {
        match resource {
            Resource::Job => {
                let job = unified.into_job()?;
                NativeRecord::from_model(&WarehouseAJob {
                    job_id: native_id(job.key, job.id)?,
                    job_title: job.name,
                    board_key: Some(job.board_key).filter(|b| !b.is_empty()),
                    last_modified: job.updated_at.or_else(|| job.created_at.clone()),
                    created_on: job.created_at,
                    payload: payload_object(job.payload),
                })
            }
            Resource::Profile => {
                let profile = unified.into_profile()?;
                NativeRecord::from_model(&WarehouseAProfile {
                    profile_id: native_id(profile.key, profile.id)?,
                    full_name: profile.info.full_name.unwrap_or_default(),
                    source_key: Some(profile.source_key).filter(|s| !s.is_empty()),
                    updated_time: profile.updated_at.or_else(|| profile.created_at.clone()),
                    created_time: profile.created_at,
                    payload: payload_object(profile.payload),
                })
            }
        }
    }

    /// Accepts `{"event_id", "type": "job.created", "job_id", "occurred_at"?}`
    /// and the profile equivalent keyed by `profile_id`.
    fn parse_event(&self, resource: Resource, raw: &Value) -> Result<Option<UnifiedEvent>> {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        let (prefix, id_field) = match resource {
            Resource::Job => ("job.", "job_id"),
            Resource::Profile => ("profile.", "profile_id"),
        };
        if !kind.starts_with(prefix) {
            return Ok(None);
        }
        let Some(resource_id) = raw.get(id_field).and_then(hrsync_core::coerce_string) else {
            return Ok(None);
        };
        let event_id = raw
            .get("event_id")
            .and_then(hrsync_core::coerce_string)
            .ok_or_else(|| SyncError::format("warehouse_a event has no event_id"))?;
        let occurred_at = raw
            .get("occurred_at")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Some(UnifiedEvent {
            event_id,
            resource,
            resource_id,
            kind: kind.parse::<EventKind>()?,
            occurred_at,
            payload: raw.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Registers a Warehouse A connector under `name`, backed by a fresh store or
/// by a JSON store file.
pub struct WarehouseAFactory {
    name: String,
    path: Option<PathBuf>,
}

impl WarehouseAFactory {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    pub fn with_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
        }
    }
}

#[async_trait]
impl ConnectorFactory for WarehouseAFactory {
    fn meta(&self) -> ConnectorMeta {
        ConnectorMeta {
            name: self.name.clone(),
            label: "Warehouse A".to_string(),
            warehouse_type: WarehouseType::Jobboard,
            resources: vec![Resource::Job, Resource::Profile],
        }
    }

    async fn build(&self) -> Result<Arc<dyn Connector>> {
        let connector = match &self.path {
            Some(path) => {
                let store = InMemoryStore::load(path).await?;
                WarehouseAConnector::new(&self.name, Arc::new(store)).persisted_to(path)
            }
            None => WarehouseAConnector::new(&self.name, Arc::new(InMemoryStore::new())),
        };
        Ok(Arc::new(connector))
    }
}
