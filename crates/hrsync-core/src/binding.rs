//! Static binding tables describing how each native field can be queried.
//!
//! Every native schema declares one [`FieldSpec`] per field. A field may carry
//! a cursor binding (it orders pagination for a [`CursorMode`]), an inclusion
//! binding (it is filterable by `IN` through a named query parameter) and/or a
//! search binding (it feeds a shared free-text parameter).

use serde::Serialize;

use crate::condition::Operator;
use crate::cursor::CursorMode;
use crate::error::{Result, SyncError};

/// Boolean connective used when rendering search expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolJoin {
    And,
    Or,
}

impl BoolJoin {
    pub fn keyword(&self) -> &'static str {
        match self {
            BoolJoin::And => " AND ",
            BoolJoin::Or => " OR ",
        }
    }
}

/// How an `IN` list is encoded into its query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEncoding {
    /// The raw JSON list.
    Array,
    /// A comma-joined string: `b1,b2`.
    Csv,
    /// A JSON-encoded list inside a string: `["b1","b2"]`.
    StringArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorBinding {
    pub mode: CursorMode,
    /// Query parameter for "value >= bound".
    pub start_param: &'static str,
    /// Query parameter for "value <= bound".
    pub end_param: &'static str,
    /// Provider keyword for ascending order.
    pub order_asc: &'static str,
    /// Provider keyword for descending order.
    pub order_desc: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InclusionBinding {
    pub param: &'static str,
    pub encoding: ListEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchBinding {
    pub param: &'static str,
    /// Joins several values of the same field.
    pub value_join: BoolJoin,
    /// Joins this field's expression with other fields on the same parameter.
    pub field_join: BoolJoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Cursor(CursorBinding),
    Inclusion(InclusionBinding),
    Search(SearchBinding),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Operators allowed when this field is used as a prefilter.
    pub prefilter_ops: &'static [Operator],
    pub bindings: &'static [Binding],
}

impl FieldSpec {
    pub fn cursor(&self) -> Option<&CursorBinding> {
        self.bindings.iter().find_map(|b| match b {
            Binding::Cursor(c) => Some(c),
            _ => None,
        })
    }

    pub fn inclusion(&self) -> Option<&InclusionBinding> {
        self.bindings.iter().find_map(|b| match b {
            Binding::Inclusion(i) => Some(i),
            _ => None,
        })
    }

    pub fn search(&self) -> Option<&SearchBinding> {
        self.bindings.iter().find_map(|b| match b {
            Binding::Search(s) => Some(s),
            _ => None,
        })
    }
}

/// The binding table of one native record type.
#[derive(Debug)]
pub struct NativeSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    /// Query parameter carrying the sort direction, if the provider has one.
    pub sort_param: Option<&'static str>,
}

impl NativeSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// The field carrying `mode` and its binding.
    pub fn cursor_field(&self, mode: CursorMode) -> Result<(&FieldSpec, &CursorBinding)> {
        self.fields
            .iter()
            .find_map(|f| f.cursor().filter(|c| c.mode == mode).map(|c| (f, c)))
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "no field with cursor={} on {}",
                    mode, self.name
                ))
            })
    }

    pub fn supports_mode(&self, mode: CursorMode) -> bool {
        self.cursor_field(mode).is_ok()
    }

    /// Describe the fields for UIs and the schema endpoints.
    pub fn describe(&self, only_prefilterable: bool) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| !only_prefilterable || !f.prefilter_ops.is_empty())
            .map(|f| FieldDescriptor {
                name: f.name,
                prefilter: f.prefilter_ops.to_vec(),
                cursor: f.cursor().map(|c| c.mode),
                inclusion: f.inclusion().copied(),
                search: f.search().copied(),
            })
            .collect()
    }
}

/// Serializable view of a [`FieldSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefilter: Vec<Operator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<InclusionBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchBinding>,
}
