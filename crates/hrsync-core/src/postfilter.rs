//! Local evaluation of "having" conditions over fetched native records.

use serde_json::Value;
use std::cmp::Ordering;

use crate::condition::{Condition, Operator};
use crate::record::{coerce_string, NativeRecord};

/// Keep the records matching every condition, in their original order.
pub fn apply_postfilters(records: Vec<NativeRecord>, conditions: &[Condition]) -> Vec<NativeRecord> {
    if conditions.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| matches_all(r, conditions))
        .collect()
}

pub fn matches_all(record: &NativeRecord, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches(record, c))
}

/// Evaluate one condition. Missing fields never raise; they simply fail to
/// match any operator except `EQ null`.
pub fn matches(record: &NativeRecord, condition: &Condition) -> bool {
    let stored = record.lookup(&condition.field);
    let expected = &condition.value;

    match condition.op {
        Operator::Eq => json_eq(stored.unwrap_or(&Value::Null), expected),
        Operator::Gt => compare(stored, expected) == Some(Ordering::Greater),
        Operator::Lt => compare(stored, expected) == Some(Ordering::Less),
        Operator::Gte => matches!(
            compare(stored, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lte => matches!(
            compare(stored, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => match (stored, expected) {
            (Some(value), Value::Array(items)) => items.iter().any(|item| json_eq(value, item)),
            _ => false,
        },
        Operator::Contains => contains(stored, expected),
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(stored: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (stored?, expected) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

fn contains(stored: Option<&Value>, needle: &Value) -> bool {
    let Some(needle) = coerce_string(needle) else {
        return false;
    };
    match stored {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(coerce_string)
            .any(|text| text.contains(&needle)),
        Some(value) => coerce_string(value).is_some_and(|text| text.contains(&needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> NativeRecord {
        NativeRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_nested_eq_preserves_order() {
        let records: Vec<_> = ["open", "closed", "open", "closed", "draft"]
            .iter()
            .enumerate()
            .map(|(i, status)| record(json!({"id": i, "payload": {"status": status}})))
            .collect();
        let having = vec![Condition::new("payload.status", Operator::Eq, "closed")];

        let kept = apply_postfilters(records, &having);
        let ids: Vec<_> = kept.iter().map(|r| r.get("id").cloned().unwrap()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_no_conditions_keeps_everything() {
        let records = vec![record(json!({"a": 1})), record(json!({"a": 2}))];
        assert_eq!(apply_postfilters(records, &[]).len(), 2);
    }

    #[test]
    fn test_eq_numbers_compare_numerically() {
        let r = record(json!({"salary": 50000}));
        assert!(matches(&r, &Condition::new("salary", Operator::Eq, 50000.0)));
        assert!(!matches(&r, &Condition::new("salary", Operator::Eq, "50000")));
    }

    #[test]
    fn test_ordering_operators() {
        let r = record(json!({"salary": 50000, "updated_at": "2024-03-01"}));
        assert!(matches(&r, &Condition::new("salary", Operator::Gt, 40000)));
        assert!(matches(&r, &Condition::new("salary", Operator::Gte, 50000)));
        assert!(!matches(&r, &Condition::new("salary", Operator::Lt, 50000)));
        assert!(matches(&r, &Condition::new("salary", Operator::Lte, 50000)));
        assert!(matches(
            &r,
            &Condition::new("updated_at", Operator::Gt, "2024-01-01")
        ));
    }

    #[test]
    fn test_ordering_on_missing_or_mismatched_is_false() {
        let r = record(json!({"salary": 50000, "note": null}));
        assert!(!matches(&r, &Condition::new("bonus", Operator::Gt, 1)));
        assert!(!matches(&r, &Condition::new("note", Operator::Lt, 1)));
        assert!(!matches(&r, &Condition::new("salary", Operator::Gt, "1")));
    }

    #[test]
    fn test_in_membership() {
        let r = record(json!({"board_key": "b2"}));
        assert!(matches(&r, &Condition::new("board_key", Operator::In, json!(["b1", "b2"]))));
        assert!(!matches(&r, &Condition::new("board_key", Operator::In, json!(["b3"]))));
        assert!(!matches(&r, &Condition::new("board_key", Operator::In, json!([]))));
        assert!(!matches(&r, &Condition::new("board_key", Operator::In, "b2")));
        assert!(!matches(&r, &Condition::new("missing", Operator::In, json!(["b2"]))));
    }

    #[test]
    fn test_contains_coercion() {
        let r = record(json!({
            "title": "Senior Rust Engineer",
            "ref": 12345,
            "tags": ["remote", "backend"],
            "empty": null
        }));
        assert!(matches(&r, &Condition::new("title", Operator::Contains, "Rust")));
        assert!(!matches(&r, &Condition::new("title", Operator::Contains, "rust")));
        assert!(matches(&r, &Condition::new("ref", Operator::Contains, "234")));
        assert!(matches(&r, &Condition::new("tags", Operator::Contains, "back")));
        assert!(!matches(&r, &Condition::new("empty", Operator::Contains, "")));
        assert!(!matches(&r, &Condition::new("nope", Operator::Contains, "x")));
    }

    #[test]
    fn test_all_conditions_must_match() {
        let r = record(json!({"status": "open", "salary": 10}));
        let both = vec![
            Condition::new("status", Operator::Eq, "open"),
            Condition::new("salary", Operator::Gt, 20),
        ];
        assert!(!matches_all(&r, &both));
    }
}
