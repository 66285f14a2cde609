//! Typed predicates used for prefilter pushdown and local postfiltering.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::binding::NativeSchema;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::In,
        Operator::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SyncError::configuration(format!("unknown operator: {}", s)))
    }
}

/// A `(field, op, value)` predicate.
///
/// `field` names a native field, or a dotted path when used as a postfilter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    /// Build an unchecked condition. Postfilters run locally and accept any
    /// field/operator pair.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// The condition's value as a list: arrays yield their items, scalars
    /// yield themselves and `null` yields nothing.
    pub fn values(&self) -> Vec<&Value> {
        match &self.value {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

/// Validating builder for prefilter conditions on one native field.
#[derive(Debug, Clone)]
pub struct ConditionBuilder {
    schema_name: &'static str,
    field: &'static str,
    allowed: &'static [Operator],
}

impl ConditionBuilder {
    /// Look up `field` in the schema's binding table. Fields without declared
    /// prefilter operators cannot be used for pushdown.
    pub fn prefilter(schema: &NativeSchema, field: &str) -> Result<Self> {
        let spec = schema.field(field).ok_or_else(|| {
            SyncError::validation(format!("{} has no field '{}'", schema.name, field))
        })?;
        if spec.prefilter_ops.is_empty() {
            return Err(SyncError::validation(format!(
                "field '{}' on {} is not eligible for prefilter expressions",
                field, schema.name
            )));
        }
        Ok(Self {
            schema_name: schema.name,
            field: spec.name,
            allowed: spec.prefilter_ops,
        })
    }

    fn build(&self, op: Operator, value: Value) -> Result<Condition> {
        if !self.allowed.contains(&op) {
            return Err(SyncError::validation(format!(
                "operator '{}' is not allowed on field '{}' of {}",
                op, self.field, self.schema_name
            )));
        }
        Ok(Condition::new(self.field, op, value))
    }

    pub fn eq(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Eq, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Gt, value.into())
    }

    pub fn gte(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Gte, value.into())
    }

    pub fn lt(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Lt, value.into())
    }

    pub fn lte(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Lte, value.into())
    }

    pub fn contains(&self, value: impl Into<Value>) -> Result<Condition> {
        self.build(Operator::Contains, value.into())
    }

    pub fn in_<I, V>(&self, values: I) -> Result<Condition>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.build(Operator::In, Value::Array(list))
    }
}

/// Check conditions received over the wire against the schema, with the same
/// rule the builder applies.
pub fn validate_prefilters(schema: &NativeSchema, conditions: &[Condition]) -> Result<()> {
    for condition in conditions {
        ConditionBuilder::prefilter(schema, &condition.field)?
            .build(condition.op, condition.value.clone())?;
    }
    Ok(())
}
