//! Compile prefilter conditions and a cursor into connector query parameters.
//!
//! Passes run in a fixed order and write into one flat map, so a later pass
//! overwrites any key an earlier pass produced:
//!
//! 1. equality: `EQ` conditions become `{field: value}`
//! 2. inclusion: `IN` conditions grouped per target parameter
//! 3. search: `CONTAINS` conditions rendered into boolean search strings
//! 4. range: `GT`/`GTE`/`LT`/`LTE` on cursor-bound fields
//! 5. cursor: the paging window and sort order

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::binding::{BoolJoin, ListEncoding, NativeSchema, SearchBinding};
use crate::condition::{Condition, Operator};
use crate::cursor::{Cursor, SortDirection};
use crate::error::{Result, SyncError};
use crate::record::coerce_string;

/// Flat parameter map handed to a connector's transport.
pub type QueryParams = BTreeMap<String, Value>;

pub fn compile_query(
    schema: &NativeSchema,
    conditions: &[Condition],
    cursor: &Cursor,
) -> Result<QueryParams> {
    let mut params = QueryParams::new();

    equality_pass(conditions, &mut params);
    inclusion_pass(schema, conditions, &mut params)?;
    search_pass(schema, conditions, &mut params);
    range_pass(schema, conditions, &mut params)?;
    cursor_pass(schema, cursor, &mut params)?;

    debug!(schema = schema.name, params = ?params, "compiled query");
    Ok(params)
}

fn equality_pass(conditions: &[Condition], params: &mut QueryParams) {
    for cond in conditions.iter().filter(|c| c.op == Operator::Eq) {
        params.insert(cond.field.clone(), cond.value.clone());
    }
}

// ---------------------------------------------------------------------------
// Inclusion
// ---------------------------------------------------------------------------

struct InclusionGroup {
    param: String,
    encoding: ListEncoding,
    values: Vec<Value>,
}

fn inclusion_pass(
    schema: &NativeSchema,
    conditions: &[Condition],
    params: &mut QueryParams,
) -> Result<()> {
    let mut groups: Vec<InclusionGroup> = Vec::new();

    for cond in conditions.iter().filter(|c| c.op == Operator::In) {
        let (param, encoding) = match schema.field(&cond.field).and_then(|f| f.inclusion()) {
            Some(binding) => (binding.param.to_string(), binding.encoding),
            None => (format!("{}__in", cond.field), ListEncoding::Array),
        };
        let values = cond.values().into_iter().cloned();
        match groups.iter_mut().find(|g| g.param == param) {
            Some(group) => group.values.extend(values),
            None => groups.push(InclusionGroup {
                param,
                encoding,
                values: values.collect(),
            }),
        }
    }

    for group in groups {
        let encoded = encode_list(group.encoding, group.values)?;
        params.insert(group.param, encoded);
    }
    Ok(())
}

fn encode_list(encoding: ListEncoding, values: Vec<Value>) -> Result<Value> {
    Ok(match encoding {
        ListEncoding::Array => Value::Array(values),
        ListEncoding::Csv => Value::String(
            values
                .iter()
                .filter_map(coerce_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        ListEncoding::StringArray => Value::String(serde_json::to_string(&values)?),
    })
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

struct SearchField<'a> {
    field: &'a str,
    binding: SearchBinding,
    terms: Vec<String>,
}

impl SearchField<'_> {
    fn render(&self) -> String {
        if self.terms.len() == 1 {
            self.terms[0].clone()
        } else {
            format!("({})", self.terms.join(self.binding.value_join.keyword()))
        }
    }
}

fn search_pass(schema: &NativeSchema, conditions: &[Condition], params: &mut QueryParams) {
    let mut fields: Vec<SearchField<'_>> = Vec::new();

    for cond in conditions.iter().filter(|c| c.op == Operator::Contains) {
        let Some(binding) = schema.field(&cond.field).and_then(|f| f.search()) else {
            continue;
        };
        let terms = cond.values().into_iter().filter_map(coerce_string);
        match fields.iter_mut().find(|f| f.field == cond.field) {
            Some(existing) => existing.terms.extend(terms),
            None => fields.push(SearchField {
                field: &cond.field,
                binding: *binding,
                terms: terms.collect(),
            }),
        }
    }

    // Parameters keep the order in which their first field appeared.
    let mut order: Vec<&'static str> = Vec::new();
    for f in &fields {
        if !order.contains(&f.binding.param) {
            order.push(f.binding.param);
        }
    }

    for param in order {
        let mut or_bucket = Vec::new();
        let mut and_bucket = Vec::new();
        for f in fields
            .iter()
            .filter(|f| f.binding.param == param && !f.terms.is_empty())
        {
            match f.binding.field_join {
                BoolJoin::Or => or_bucket.push(f.render()),
                BoolJoin::And => and_bucket.push(f.render()),
            }
        }
        let rendered = match (or_bucket.is_empty(), and_bucket.is_empty()) {
            (true, true) => continue,
            (false, true) => or_bucket.join(BoolJoin::Or.keyword()),
            (true, false) => and_bucket.join(BoolJoin::And.keyword()),
            (false, false) => format!(
                "({}) AND ({})",
                or_bucket.join(BoolJoin::Or.keyword()),
                and_bucket.join(BoolJoin::And.keyword())
            ),
        };
        params.insert(param.to_string(), Value::String(rendered));
    }
}

// ---------------------------------------------------------------------------
// Range and cursor
// ---------------------------------------------------------------------------

fn range_pass(
    schema: &NativeSchema,
    conditions: &[Condition],
    params: &mut QueryParams,
) -> Result<()> {
    for cond in conditions.iter().filter(|c| {
        matches!(
            c.op,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }) {
        let binding = schema
            .field(&cond.field)
            .and_then(|f| f.cursor())
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "range operator '{}' on field '{}' of {} has no cursor binding",
                    cond.op, cond.field, schema.name
                ))
            })?;
        let param = match cond.op {
            Operator::Gt | Operator::Gte => binding.start_param,
            _ => binding.end_param,
        };
        params.insert(param.to_string(), cond.value.clone());
    }
    Ok(())
}

fn cursor_pass(schema: &NativeSchema, cursor: &Cursor, params: &mut QueryParams) -> Result<()> {
    let (_, binding) = schema.cursor_field(cursor.mode)?;

    let (lower, upper, keyword) = match cursor.sort_by {
        SortDirection::Asc => (binding.start_param, binding.end_param, binding.order_asc),
        SortDirection::Desc => (binding.end_param, binding.start_param, binding.order_desc),
    };
    if let Some(start) = &cursor.start {
        params.insert(lower.to_string(), Value::String(start.clone()));
    }
    if let Some(end) = &cursor.end {
        params.insert(upper.to_string(), Value::String(end.clone()));
    }
    if let Some(sort_param) = schema.sort_param {
        params.insert(sort_param.to_string(), Value::String(keyword.to_string()));
    }
    Ok(())
}
