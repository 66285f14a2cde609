//! HrFlow.ai connector.
//!
//! HrFlow stores jobs and profiles in the unified shape, so its native schema
//! is the unified schema and conversions are plain (de)serialization. Reads go
//! through `GET /storing/{jobs|profiles}`, writes through
//! `POST /{job|profile}/indexing`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use hrsync_core::{
    coerce_string, compile_query, unified_schema, Condition, Cursor, EventKind, NativeRecord,
    NativeSchema, QueryParams, Resource, Result, SyncError, UnifiedEvent, UnifiedJob,
    UnifiedProfile, UnifiedRecord, WarehouseType,
};

use crate::auth::HttpAuth;
use crate::error::ConnectorError;
use crate::factory::{ConnectorFactory, ConnectorMeta};
use crate::{Connector, ReadBatch};

pub const DEFAULT_BASE_URL: &str = "https://api.hrflow.ai/v1";

/// Credentials and scope of an HrFlow workspace.
///
/// `api_key` is redacted in `Debug` output.
#[derive(Clone)]
pub struct HrflowConfig {
    pub base_url: String,
    pub api_key: String,
    /// Sent as `X-USER-EMAIL`.
    pub api_user: String,
    /// Board that jobs are listed from and indexed into.
    pub board_key: String,
    /// Source that profiles are listed from and indexed into.
    pub source_key: String,
}

impl std::fmt::Debug for HrflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrflowConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("api_user", &self.api_user)
            .field("board_key", &self.board_key)
            .field("source_key", &self.source_key)
            .finish()
    }
}

impl HrflowConfig {
    /// Build an HrflowConfig from environment variables:
    ///   HRFLOW_BASE_URL, HRFLOW_API_KEY, HRFLOW_API_USER, HRFLOW_BOARD_KEY,
    ///   HRFLOW_SOURCE_KEY
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("HRFLOW_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("HRFLOW_API_KEY").context("HRFLOW_API_KEY not set")?,
            api_user: std::env::var("HRFLOW_API_USER").context("HRFLOW_API_USER not set")?,
            board_key: std::env::var("HRFLOW_BOARD_KEY").context("HRFLOW_BOARD_KEY not set")?,
            source_key: std::env::var("HRFLOW_SOURCE_KEY")
                .context("HRFLOW_SOURCE_KEY not set")?,
        })
    }

    pub fn auth(&self) -> HttpAuth {
        HttpAuth::api_key("X-API-KEY", &self.api_key)
    }

    fn scope_key(&self, resource: Resource) -> &str {
        match resource {
            Resource::Job => &self.board_key,
            Resource::Profile => &self.source_key,
        }
    }
}

/// Flatten compiled parameters into query pairs. Lists repeat their key,
/// nulls are dropped.
pub fn to_query_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                for item in items.iter().filter_map(coerce_string) {
                    pairs.push((key.clone(), item));
                }
            }
            other => {
                if let Some(text) = coerce_string(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

fn resource_segment(resource: Resource) -> (&'static str, &'static str, &'static str) {
    // (listing path, indexing path, scope field)
    match resource {
        Resource::Job => ("storing/jobs", "job/indexing", "board_key"),
        Resource::Profile => ("storing/profiles", "profile/indexing", "source_key"),
    }
}

pub struct HrflowConnector {
    name: String,
    config: HrflowConfig,
    http: reqwest::Client,
}

impl HrflowConnector {
    pub fn new(name: impl Into<String>, config: HrflowConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(ConnectorError::from)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            config,
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.config
            .auth()
            .apply(self.http.request(method, url))
            .header("X-USER-EMAIL", &self.config.api_user)
    }

    async fn get_one(&self, resource: Resource, key: &str) -> Result<Option<NativeRecord>> {
        let (_, indexing, scope_field) = resource_segment(resource);
        let response = self
            .request(Method::GET, indexing)
            .query(&[(scope_field, self.config.scope_key(resource)), ("key", key)])
            .send()
            .await
            .map_err(|e| SyncError::Fetch(ConnectorError::from(e).to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(connector = %self.name, %resource, key, "record not found");
            return Ok(None);
        }
        let body: Value = response
            .error_for_status()
            .map_err(|e| SyncError::Fetch(ConnectorError::from(e).to_string()))?
            .json()
            .await
            .map_err(|e| SyncError::Fetch(ConnectorError::from(e).to_string()))?;

        match body.get("data") {
            Some(Value::Null) | None => Ok(None),
            Some(data) => Ok(Some(NativeRecord::from_value(data.clone())?)),
        }
    }
}

/// The listed records of a `/storing` response: `data` is either the list
/// itself or an object holding it under `jobs`/`profiles`.
fn listed_records(body: &Value, resource: Resource) -> Result<Vec<NativeRecord>> {
    let plural = match resource {
        Resource::Job => "jobs",
        Resource::Profile => "profiles",
    };
    let items = match body.get("data") {
        Some(Value::Array(items)) => items,
        Some(Value::Object(data)) => match data.get(plural) {
            Some(Value::Array(items)) => items,
            _ => return Err(invalid_response(format!("data has no '{}' list", plural))),
        },
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => return Err(invalid_response("data is not a list")),
    };
    items
        .iter()
        .cloned()
        .map(NativeRecord::from_value)
        .collect()
}

fn invalid_response(msg: impl Into<String>) -> SyncError {
    ConnectorError::InvalidResponse(msg.into()).into()
}

#[async_trait]
impl Connector for HrflowConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Customers
    }

    fn schema(&self, resource: Resource) -> Result<&'static NativeSchema> {
        Ok(unified_schema(resource))
    }

    async fn read_batch(
        &self,
        resource: Resource,
        prefilters: &[Condition],
        cursor: &Cursor,
        batch_size: usize,
    ) -> Result<ReadBatch> {
        let schema = self.schema(resource)?;
        let mut params = compile_query(schema, prefilters, cursor)?;
        params.insert("limit".to_string(), json!(batch_size));
        let scope_param = match resource {
            Resource::Job => "board_keys",
            Resource::Profile => "source_keys",
        };
        if !params.contains_key(scope_param) {
            let scope = serde_json::to_string(&[self.config.scope_key(resource)])?;
            params.insert(scope_param.to_string(), Value::String(scope));
        }

        let (listing, _, _) = resource_segment(resource);
        let body: Value = self
            .request(Method::GET, listing)
            .query(&to_query_pairs(&params))
            .send()
            .await
            .map_err(ConnectorError::from)?
            .error_for_status()
            .map_err(ConnectorError::from)?
            .json()
            .await
            .map_err(ConnectorError::from)?;

        let records = listed_records(&body, resource)?;
        let next = if !records.is_empty() && records.len() >= batch_size {
            match records.last() {
                Some(last) => self.extract_cursor(resource, last, cursor.mode)?,
                None => None,
            }
        } else {
            None
        };
        debug!(connector = %self.name, %resource, count = records.len(), ?next, "read page");
        Ok(ReadBatch::new(records, next))
    }

    async fn write_native_batch(
        &self,
        resource: Resource,
        records: Vec<NativeRecord>,
    ) -> Result<()> {
        let (_, indexing, scope_field) = resource_segment(resource);
        let count = records.len();
        for record in records {
            let mut body = Map::new();
            body.insert(
                scope_field.to_string(),
                Value::String(self.config.scope_key(resource).to_string()),
            );
            body.insert(resource.as_str().to_string(), record.into_value());
            self.request(Method::POST, indexing)
                .json(&Value::Object(body))
                .send()
                .await
                .map_err(ConnectorError::from)?
                .error_for_status()
                .map_err(ConnectorError::from)?;
        }
        info!(connector = %self.name, %resource, count, "indexed records");
        Ok(())
    }

    fn get_id(&self, resource: Resource, record: &NativeRecord) -> Result<String> {
        record
            .get("key")
            .and_then(coerce_string)
            .ok_or_else(|| SyncError::format(format!("hrflow {} record has no key", resource)))
    }

    async fn fetch_by_event_ids(
        &self,
        resource: Resource,
        ids: &[String],
    ) -> Result<Vec<NativeRecord>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_one(resource, id).await? {
                found.push(record);
            }
        }
        Ok(found)
    }

    fn to_unified(&self, resource: Resource, record: &NativeRecord) -> Result<UnifiedRecord> {
        Ok(match resource {
            Resource::Job => {
                let mut job: UnifiedJob = record.to_model()?;
                if job.origin.is_empty() {
                    job.origin = self.name.clone();
                }
                UnifiedRecord::Job(job)
            }
            Resource::Profile => {
                let mut profile: UnifiedProfile = record.to_model()?;
                if profile.origin.is_empty() {
                    profile.origin = self.name.clone();
                }
                UnifiedRecord::Profile(profile)
            }
        })
    }

    fn from_unified(&self, resource: Resource, unified: UnifiedRecord) -> Result<NativeRecord> {
        match resource {
            Resource::Job => NativeRecord::from_model(&unified.into_job()?),
            Resource::Profile => NativeRecord::from_model(&unified.into_profile()?),
        }
    }

    /// Accepts `{"id", "type": "job.created", "timestamp", "data": {"job": {"key"}}}`
    /// and the profile equivalent. Unrecognized event verbs become `upserted`.
    fn parse_event(&self, resource: Resource, raw: &Value) -> Result<Option<UnifiedEvent>> {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        if !kind.starts_with(&format!("{}.", resource.as_str())) {
            return Ok(None);
        }
        let Some(entity) = raw.get("data").and_then(|d| d.get(resource.as_str())) else {
            return Ok(None);
        };
        let Some(resource_id) = entity
            .get("key")
            .or_else(|| entity.get("id"))
            .and_then(coerce_string)
        else {
            return Ok(None);
        };
        let Some(event_id) = raw.get("id").and_then(coerce_string) else {
            return Ok(None);
        };
        let occurred_at = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Some(UnifiedEvent {
            event_id,
            resource,
            resource_id,
            kind: kind.parse().unwrap_or(EventKind::Upserted),
            occurred_at,
            payload: raw.clone(),
        }))
    }
}

/// Registers an HrFlow connector with a fixed configuration.
pub struct HrflowFactory {
    name: String,
    config: HrflowConfig,
}

impl HrflowFactory {
    pub fn new(name: impl Into<String>, config: HrflowConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[async_trait]
impl ConnectorFactory for HrflowFactory {
    fn meta(&self) -> ConnectorMeta {
        ConnectorMeta {
            name: self.name.clone(),
            label: "HrFlow.ai".to_string(),
            warehouse_type: WarehouseType::Customers,
            resources: vec![Resource::Job, Resource::Profile],
        }
    }

    async fn build(&self) -> Result<Arc<dyn Connector>> {
        Ok(Arc::new(HrflowConnector::new(&self.name, self.config.clone())?))
    }
}
