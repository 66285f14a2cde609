//! HTTP routes over the connector registry and the pull/push engines.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use hrsync_connectors::{ConnectorMeta, ConnectorRegistry};
use hrsync_core::{unified_schema, Cursor, FieldDescriptor, Resource, SyncError};
use hrsync_engine::{run_pull, run_push, FormatterStore, MappingSpec, PullConfig, PushConfig, PushResult};

/// Application state shared across handlers
pub struct AppState {
    pub registry: ConnectorRegistry,
    pub formatters: FormatterStore,
}

impl AppState {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            formatters: FormatterStore::new(),
        }
    }

    fn require_connector(&self, name: &str) -> Result<(), ApiError> {
        if self.registry.contains(name) {
            Ok(())
        } else {
            Err(ApiError(
                StatusCode::NOT_FOUND,
                format!("Connector '{}' not found", name),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error response: `{"error": message}` with a status code.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = if e.is_fatal_setup() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            warn!("Request failed: {}", self.1);
        }
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> &'static str {
    "OK"
}

async fn list_connectors(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectorMeta>> {
    Json(state.registry.list())
}

#[derive(Debug, Default, Deserialize)]
struct SchemaQuery {
    #[serde(default)]
    prefilterable: bool,
}

/// GET /api/schema/:connector/:resource. The connector name `unified` selects
/// the unified schema.
async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path((connector, resource)): Path<(String, Resource)>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<Vec<FieldDescriptor>>, ApiError> {
    let schema = if connector == "unified" {
        unified_schema(resource)
    } else {
        state.require_connector(&connector)?;
        state.registry.get(&connector).await?.schema(resource)?
    };
    Ok(Json(schema.describe(query.prefilterable)))
}

#[derive(Debug, Deserialize)]
struct BuildFormatterRequest {
    mapping: Vec<MappingSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildFormatterResponse {
    pub formatter_id: String,
    pub mapping: Vec<MappingSpec>,
}

async fn build_formatter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildFormatterRequest>,
) -> Result<Json<BuildFormatterResponse>, ApiError> {
    if req.mapping.is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "mapping must not be empty".to_string(),
        ));
    }
    let formatter_id = state.formatters.insert(req.mapping.clone()).await;
    Ok(Json(BuildFormatterResponse {
        formatter_id,
        mapping: req.mapping,
    }))
}

async fn pull(
    State(state): State<Arc<AppState>>,
    Json(config): Json<PullConfig>,
) -> Result<Json<Cursor>, ApiError> {
    state.require_connector(&config.origin)?;
    state.require_connector(&config.target)?;
    let cursor = run_pull(&config, &state.registry, &state.formatters).await?;
    Ok(Json(cursor))
}

async fn push(
    State(state): State<Arc<AppState>>,
    Json(config): Json<PushConfig>,
) -> Result<Json<PushResult>, ApiError> {
    state.require_connector(&config.origin)?;
    state.require_connector(&config.target)?;
    let result = run_push(&config, &state.registry, &state.formatters).await?;
    Ok(Json(result))
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/connectors", get(list_connectors))
        .route("/api/schema/:connector/:resource", get(get_schema))
        .route("/api/formatters/build", post(build_formatter))
        .route("/api/run/pull", post(pull))
        .route("/api/run/push", post(push))
        .with_state(state)
}
