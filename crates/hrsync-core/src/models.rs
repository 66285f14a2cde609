//! Unified (canonical) job and profile models, unified events, and the
//! binding tables of the unified schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::binding::{
    Binding, BoolJoin, CursorBinding, FieldSpec, InclusionBinding, ListEncoding, NativeSchema,
    SearchBinding,
};
use crate::condition::Operator;
use crate::cursor::CursorMode;
use crate::error::{Result, SyncError};
use crate::resource::Resource;

// ---------------------------------------------------------------------------
// Shared value objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub text: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A named entity such as a tag, language or certification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralEntity {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl GeneralEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    /// `hard` or `soft`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFloat {
    pub name: Option<String>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeDate {
    pub name: Option<String>,
    pub value_min: Option<String>,
    pub value_max: Option<String>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiedJob {
    pub id: Option<String>,
    /// Name of the connector the job was read from.
    pub origin: String,
    pub key: String,
    pub reference: Option<String>,
    pub board_key: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub archived_at: Option<String>,
    pub name: String,
    pub summary: Option<String>,
    pub location: Location,
    pub url: Option<String>,
    pub text: Option<String>,
    pub culture: Option<String>,
    pub benefits: Option<String>,
    pub responsibilities: Option<String>,
    pub requirements: Option<String>,
    pub interviews: Option<String>,
    pub skills: Vec<Skill>,
    pub languages: Vec<GeneralEntity>,
    pub tags: Vec<GeneralEntity>,
    pub metadatas: Vec<GeneralEntity>,
    pub ranges_float: Vec<RangeFloat>,
    pub ranges_date: Vec<RangeDate>,
    /// Connector-specific data carried through unchanged.
    pub payload: Option<Value>,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileInfo {
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_birth: Option<String>,
    pub location: Option<Location>,
    pub picture: Option<String>,
    pub gender: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub key: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub location: Option<Location>,
    pub description: Option<String>,
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    pub key: Option<String>,
    pub title: Option<String>,
    pub school: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub location: Option<Location>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiedProfile {
    pub id: Option<String>,
    pub origin: String,
    pub key: String,
    pub reference: Option<String>,
    pub source_key: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub archived_at: Option<String>,
    pub info: ProfileInfo,
    pub text: Option<String>,
    /// ISO 639-1 code.
    pub text_language: Option<String>,
    pub experiences_duration: Option<f64>,
    pub educations_duration: Option<f64>,
    pub experiences: Vec<Experience>,
    pub educations: Vec<Education>,
    pub skills: Vec<Skill>,
    pub languages: Vec<GeneralEntity>,
    pub interests: Vec<GeneralEntity>,
    pub tags: Vec<GeneralEntity>,
    pub metadatas: Vec<GeneralEntity>,
    pub payload: Option<Value>,
}

// ---------------------------------------------------------------------------
// Resource-tagged wrapper
// ---------------------------------------------------------------------------

/// A unified record of either resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "lowercase")]
pub enum UnifiedRecord {
    Job(UnifiedJob),
    Profile(UnifiedProfile),
}

impl UnifiedRecord {
    pub fn resource(&self) -> Resource {
        match self {
            UnifiedRecord::Job(_) => Resource::Job,
            UnifiedRecord::Profile(_) => Resource::Profile,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            UnifiedRecord::Job(job) => &job.key,
            UnifiedRecord::Profile(profile) => &profile.key,
        }
    }

    pub fn into_job(self) -> Result<UnifiedJob> {
        match self {
            UnifiedRecord::Job(job) => Ok(job),
            other => Err(SyncError::format(format!(
                "expected a unified job, got a {}",
                other.resource()
            ))),
        }
    }

    pub fn into_profile(self) -> Result<UnifiedProfile> {
        match self {
            UnifiedRecord::Profile(profile) => Ok(profile),
            other => Err(SyncError::format(format!(
                "expected a unified profile, got a {}",
                other.resource()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Upserted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Upserted => "upserted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    /// Accepts `created` as well as dotted webhook types like `job.created`.
    fn from_str(s: &str) -> Result<Self> {
        let suffix = s.rsplit('.').next().unwrap_or(s);
        match suffix {
            "created" => Ok(EventKind::Created),
            "updated" | "edited" => Ok(EventKind::Updated),
            "deleted" | "archived" => Ok(EventKind::Deleted),
            "upserted" | "indexed" => Ok(EventKind::Upserted),
            other => Err(SyncError::format(format!("unknown event type: {}", other))),
        }
    }
}

/// A change notification resolved from a connector's webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub event_id: String,
    pub resource: Resource,
    /// Native id of the record the event refers to.
    pub resource_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Unified schema bindings
// ---------------------------------------------------------------------------

const DATE_OPS: &[Operator] = &[Operator::Gte, Operator::Lte];

const fn date_cursor(mode: CursorMode) -> Binding {
    Binding::Cursor(CursorBinding {
        mode,
        start_param: "date_range_min",
        end_param: "date_range_max",
        order_asc: "asc",
        order_desc: "desc",
    })
}

const KEYWORDS: Binding = Binding::Search(SearchBinding {
    param: "keywords",
    value_join: BoolJoin::Or,
    field_join: BoolJoin::And,
});

const fn plain(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        prefilter_ops: &[],
        bindings: &[],
    }
}

static UNIFIED_JOB_FIELDS: &[FieldSpec] = &[
    plain("id"),
    plain("origin"),
    FieldSpec {
        name: "key",
        prefilter_ops: &[Operator::Eq],
        bindings: &[],
    },
    FieldSpec {
        name: "reference",
        prefilter_ops: &[Operator::Eq],
        bindings: &[],
    },
    FieldSpec {
        name: "board_key",
        prefilter_ops: &[Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "board_keys",
            encoding: ListEncoding::StringArray,
        })],
    },
    FieldSpec {
        name: "created_at",
        prefilter_ops: DATE_OPS,
        bindings: &[date_cursor(CursorMode::CreatedAt)],
    },
    FieldSpec {
        name: "updated_at",
        prefilter_ops: DATE_OPS,
        bindings: &[date_cursor(CursorMode::UpdatedAt)],
    },
    plain("archived_at"),
    FieldSpec {
        name: "name",
        prefilter_ops: &[Operator::Contains],
        bindings: &[KEYWORDS],
    },
    plain("summary"),
    plain("location"),
    plain("url"),
    FieldSpec {
        name: "text",
        prefilter_ops: &[Operator::Contains],
        bindings: &[KEYWORDS],
    },
    plain("culture"),
    plain("benefits"),
    plain("responsibilities"),
    plain("requirements"),
    plain("interviews"),
    plain("skills"),
    plain("languages"),
    FieldSpec {
        name: "tags",
        prefilter_ops: &[Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "tags",
            encoding: ListEncoding::StringArray,
        })],
    },
    plain("metadatas"),
    plain("ranges_float"),
    plain("ranges_date"),
    plain("payload"),
];

static UNIFIED_PROFILE_FIELDS: &[FieldSpec] = &[
    plain("id"),
    plain("origin"),
    FieldSpec {
        name: "key",
        prefilter_ops: &[Operator::Eq],
        bindings: &[],
    },
    FieldSpec {
        name: "reference",
        prefilter_ops: &[Operator::Eq],
        bindings: &[],
    },
    FieldSpec {
        name: "source_key",
        prefilter_ops: &[Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "source_keys",
            encoding: ListEncoding::StringArray,
        })],
    },
    FieldSpec {
        name: "created_at",
        prefilter_ops: DATE_OPS,
        bindings: &[date_cursor(CursorMode::CreatedAt)],
    },
    FieldSpec {
        name: "updated_at",
        prefilter_ops: DATE_OPS,
        bindings: &[date_cursor(CursorMode::UpdatedAt)],
    },
    plain("archived_at"),
    plain("info"),
    FieldSpec {
        name: "text",
        prefilter_ops: &[Operator::Contains],
        bindings: &[KEYWORDS],
    },
    plain("text_language"),
    plain("experiences_duration"),
    plain("educations_duration"),
    plain("experiences"),
    plain("educations"),
    plain("skills"),
    plain("languages"),
    FieldSpec {
        name: "tags",
        prefilter_ops: &[Operator::In],
        bindings: &[Binding::Inclusion(InclusionBinding {
            param: "tags",
            encoding: ListEncoding::Array,
        })],
    },
    plain("interests"),
    plain("metadatas"),
    plain("payload"),
];

pub static UNIFIED_JOB_SCHEMA: NativeSchema = NativeSchema {
    name: "UnifiedJob",
    fields: UNIFIED_JOB_FIELDS,
    sort_param: Some("order_by"),
};

pub static UNIFIED_PROFILE_SCHEMA: NativeSchema = NativeSchema {
    name: "UnifiedProfile",
    fields: UNIFIED_PROFILE_FIELDS,
    sort_param: Some("order_by"),
};

/// The unified binding table for `resource`.
pub fn unified_schema(resource: Resource) -> &'static NativeSchema {
    match resource {
        Resource::Job => &UNIFIED_JOB_SCHEMA,
        Resource::Profile => &UNIFIED_PROFILE_SCHEMA,
    }
}
