//! hrsync core: the connector-agnostic pieces of the sync engine.
//!
//! Conditions and their validating builder, per-schema binding tables, the
//! query compiler that turns conditions and a cursor into provider query
//! parameters, the local postfilter evaluator, the cursor resolver and the
//! unified job/profile models.

pub mod binding;
pub mod condition;
pub mod cursor;
pub mod error;
pub mod models;
pub mod postfilter;
pub mod query;
pub mod record;
pub mod resource;

pub use binding::{
    Binding, BoolJoin, CursorBinding, FieldDescriptor, FieldSpec, InclusionBinding, ListEncoding,
    NativeSchema, SearchBinding,
};
pub use condition::{validate_prefilters, Condition, ConditionBuilder, Operator};
pub use cursor::{extract_cursor, Cursor, CursorMode, SortDirection};
pub use error::{Result, SyncError};
pub use models::{
    unified_schema, EventKind, UnifiedEvent, UnifiedJob, UnifiedProfile, UnifiedRecord,
};
pub use postfilter::{apply_postfilters, matches, matches_all};
pub use query::{compile_query, QueryParams};
pub use record::{coerce_string, NativeRecord};
pub use resource::{Resource, WarehouseType};
