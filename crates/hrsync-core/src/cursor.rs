//! Cursor model and the resolver mapping paging modes onto native fields.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::binding::NativeSchema;
use crate::error::Result;
use crate::record::{coerce_string, NativeRecord};

/// Which ordering semantic drives incremental paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    Id,
    CreatedAt,
    UpdatedAt,
}

impl CursorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorMode::Id => "id",
            CursorMode::CreatedAt => "created_at",
            CursorMode::UpdatedAt => "updated_at",
        }
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A resumable position.
///
/// `start` is supplied by the caller; `end` is written by the pull engine as
/// the position reached. `start = None` reads from the beginning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub mode: CursorMode,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub sort_by: SortDirection,
}

impl Cursor {
    pub fn new(mode: CursorMode) -> Self {
        Self {
            mode,
            start: None,
            end: None,
            sort_by: SortDirection::Asc,
        }
    }

    pub fn starting_at(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.sort_by = SortDirection::Desc;
        self
    }

    /// The same cursor positioned at `position`, used for the next page read.
    pub fn at(&self, position: Option<String>) -> Self {
        Self {
            mode: self.mode,
            start: position,
            end: None,
            sort_by: self.sort_by,
        }
    }

    /// A cursor that resumes where this one ended.
    pub fn resume(&self) -> Self {
        Self {
            mode: self.mode,
            start: self.end.clone().or_else(|| self.start.clone()),
            end: None,
            sort_by: self.sort_by,
        }
    }
}

/// Read the value of the field bound to `mode`.
///
/// Fails with a configuration error when the schema binds no field to `mode`;
/// returns `None` when the field is missing or null on this record.
pub fn extract_cursor(
    record: &NativeRecord,
    schema: &NativeSchema,
    mode: CursorMode,
) -> Result<Option<String>> {
    let (field, _) = schema.cursor_field(mode)?;
    Ok(record.get(field.name).and_then(coerce_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binding, CursorBinding, FieldSpec};
    use crate::error::SyncError;
    use serde_json::json;

    static FIELDS: &[FieldSpec] = &[
        FieldSpec {
            name: "job_id",
            prefilter_ops: &[],
            bindings: &[Binding::Cursor(CursorBinding {
                mode: CursorMode::Id,
                start_param: "id_from",
                end_param: "id_to",
                order_asc: "asc",
                order_desc: "desc",
            })],
        },
        FieldSpec {
            name: "last_modified",
            prefilter_ops: &[],
            bindings: &[Binding::Cursor(CursorBinding {
                mode: CursorMode::UpdatedAt,
                start_param: "updated_from",
                end_param: "updated_to",
                order_asc: "asc",
                order_desc: "desc",
            })],
        },
    ];

    static SCHEMA: NativeSchema = NativeSchema {
        name: "Job",
        fields: FIELDS,
        sort_param: None,
    };

    #[test]
    fn test_cursor_json_shape() {
        let cursor = Cursor::new(CursorMode::UpdatedAt).starting_at("2024-01-01");
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(
            json,
            json!({"mode": "updated_at", "start": "2024-01-01", "end": null, "sort_by": "asc"})
        );
    }

    #[test]
    fn test_cursor_deserialize_defaults() {
        let cursor: Cursor = serde_json::from_str(r#"{"mode":"id"}"#).unwrap();
        assert_eq!(cursor.mode, CursorMode::Id);
        assert_eq!(cursor.start, None);
        assert_eq!(cursor.sort_by, SortDirection::Asc);
    }

    #[test]
    fn test_resume_prefers_end() {
        let mut cursor = Cursor::new(CursorMode::Id).starting_at("a");
        cursor.end = Some("f".to_string());
        assert_eq!(cursor.resume().start.as_deref(), Some("f"));

        let untouched = Cursor::new(CursorMode::Id).starting_at("a");
        assert_eq!(untouched.resume().start.as_deref(), Some("a"));
    }

    #[test]
    fn test_extract_bound_field() {
        let record = NativeRecord::from_value(json!({
            "job_id": "j-7",
            "last_modified": "2024-03-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            extract_cursor(&record, &SCHEMA, CursorMode::Id).unwrap().as_deref(),
            Some("j-7")
        );
        assert_eq!(
            extract_cursor(&record, &SCHEMA, CursorMode::UpdatedAt)
                .unwrap()
                .as_deref(),
            Some("2024-03-01T00:00:00Z")
        );
    }

    #[test]
    fn test_extract_numeric_and_missing() {
        let record = NativeRecord::from_value(json!({"job_id": 42})).unwrap();
        assert_eq!(
            extract_cursor(&record, &SCHEMA, CursorMode::Id).unwrap().as_deref(),
            Some("42")
        );
        assert_eq!(
            extract_cursor(&record, &SCHEMA, CursorMode::UpdatedAt).unwrap(),
            None
        );
    }

    #[test]
    fn test_extract_unbound_mode_fails() {
        let record = NativeRecord::from_value(json!({"job_id": "j-1"})).unwrap();
        let err = extract_cursor(&record, &SCHEMA, CursorMode::CreatedAt).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
