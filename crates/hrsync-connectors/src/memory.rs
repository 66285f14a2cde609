//! In-memory record store with cursor paging and JSON file persistence.
//!
//! Records are kept per resource and upserted by id. Paging orders records by
//! the field bound to the cursor mode, ties broken by id. A plain
//! `cursor.start` is an inclusive bound. The `next` position of a full page is
//! a `[position, id]` token, and a page read from such a token starts strictly
//! after that record, so records sharing a cursor value are never split or
//! skipped across pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use hrsync_core::{
    compile_query, extract_cursor, matches, BoolJoin, Condition, Cursor, CursorMode,
    NativeRecord, NativeSchema, Operator, Resource, Result, SortDirection, SyncError,
};

use crate::error::ConnectorError;
use crate::ReadBatch;

/// On-disk layout of a store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    job: Vec<NativeRecord>,
    #[serde(default)]
    profile: Vec<NativeRecord>,
}

impl Snapshot {
    fn records(&self, resource: Resource) -> &Vec<NativeRecord> {
        match resource {
            Resource::Job => &self.job,
            Resource::Profile => &self.profile,
        }
    }

    fn records_mut(&mut self, resource: Resource) -> &mut Vec<NativeRecord> {
        match resource {
            Resource::Job => &mut self.job,
            Resource::Profile => &mut self.profile,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<Snapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store file. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let snapshot = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(ConnectorError::from(e).into()),
        };
        Ok(Self {
            state: Mutex::new(snapshot),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = {
            let state = self.state.lock().await;
            serde_json::to_vec_pretty(&*state)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ConnectorError::from)?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(ConnectorError::from)?;
        Ok(())
    }

    pub async fn len(&self, resource: Resource) -> usize {
        self.state.lock().await.records(resource).len()
    }

    pub async fn is_empty(&self, resource: Resource) -> bool {
        self.len(resource).await == 0
    }

    pub async fn all(&self, resource: Resource) -> Vec<NativeRecord> {
        self.state.lock().await.records(resource).clone()
    }

    /// Insert or replace records, matching on the field bound to `id`.
    pub async fn upsert(
        &self,
        schema: &NativeSchema,
        resource: Resource,
        records: Vec<NativeRecord>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.records_mut(resource);
        for record in records {
            let id = require_id(schema, &record)?;
            let existing = stored.iter().position(|r| {
                extract_cursor(r, schema, CursorMode::Id).ok().flatten().as_deref()
                    == Some(id.as_str())
            });
            match existing {
                Some(index) => stored[index] = record,
                None => stored.push(record),
            }
        }
        Ok(())
    }

    /// Records whose id is in `ids`, in the order of `ids`.
    pub async fn get_many(
        &self,
        schema: &NativeSchema,
        resource: Resource,
        ids: &[String],
    ) -> Result<Vec<NativeRecord>> {
        let state = self.state.lock().await;
        let stored = state.records(resource);
        let mut found = Vec::new();
        for id in ids {
            for record in stored {
                if extract_cursor(record, schema, CursorMode::Id)?.as_deref() == Some(id.as_str()) {
                    found.push(record.clone());
                    break;
                }
            }
        }
        Ok(found)
    }

    /// Read one page.
    ///
    /// The prefilters are compiled against `schema` first so misconfigured
    /// conditions fail the same way they would against a remote provider,
    /// then evaluated locally.
    pub async fn page(
        &self,
        schema: &NativeSchema,
        resource: Resource,
        prefilters: &[Condition],
        cursor: &Cursor,
        batch_size: usize,
    ) -> Result<ReadBatch> {
        if batch_size == 0 {
            return Err(SyncError::configuration("batch size must be at least 1"));
        }
        let params = compile_query(schema, prefilters, cursor)?;
        debug!(schema = schema.name, ?params, "paging in-memory store");

        let start = cursor.start.as_deref().map(Resume::parse);
        let state = self.state.lock().await;
        let mut candidates: Vec<(String, String, &NativeRecord)> = Vec::new();
        for record in state.records(resource) {
            let Some(position) = extract_cursor(record, schema, cursor.mode)? else {
                continue;
            };
            let id = extract_cursor(record, schema, CursorMode::Id)
                .ok()
                .flatten()
                .unwrap_or_default();
            if !within_window(&position, &id, start.as_ref(), cursor)
                || !matches_prefilters(schema, record, prefilters)
            {
                continue;
            }
            candidates.push((position, id, record));
        }

        candidates.sort_by(|a, b| {
            let ord = a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1));
            match cursor.sort_by {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        candidates.truncate(batch_size);

        let next = match candidates.last() {
            Some((position, id, _)) if candidates.len() == batch_size => {
                Some(Resume::token(position, id)?)
            }
            _ => None,
        };
        let records = candidates.into_iter().map(|(_, _, r)| r.clone()).collect();
        Ok(ReadBatch::new(records, next))
    }
}

fn require_id(schema: &NativeSchema, record: &NativeRecord) -> Result<String> {
    extract_cursor(record, schema, CursorMode::Id)?
        .ok_or_else(|| SyncError::format(format!("{} record has no id", schema.name)))
}

/// Where a page starts.
#[derive(Debug, PartialEq)]
enum Resume {
    /// A caller-supplied position, inclusive.
    At(String),
    /// Strictly after the record `(position, id)` returned last.
    After(String, String),
}

impl Resume {
    fn parse(start: &str) -> Self {
        match serde_json::from_str::<(String, String)>(start) {
            Ok((position, id)) => Resume::After(position, id),
            Err(_) => Resume::At(start.to_string()),
        }
    }

    fn token(position: &str, id: &str) -> Result<String> {
        Ok(serde_json::to_string(&(position, id))?)
    }
}

/// At or past `start` in traversal order, and not beyond `end`.
fn within_window(position: &str, id: &str, start: Option<&Resume>, cursor: &Cursor) -> bool {
    let end = cursor.end.as_deref();
    match cursor.sort_by {
        SortDirection::Asc => {
            let after_start = match start {
                None => true,
                Some(Resume::At(s)) => position >= s.as_str(),
                Some(Resume::After(p, i)) => (position, id) > (p.as_str(), i.as_str()),
            };
            after_start && end.map_or(true, |e| position <= e)
        }
        SortDirection::Desc => {
            let after_start = match start {
                None => true,
                Some(Resume::At(s)) => position <= s.as_str(),
                Some(Resume::After(p, i)) => (position, id) < (p.as_str(), i.as_str()),
            };
            after_start && end.map_or(true, |e| position >= e)
        }
    }
}

/// Local stand-in for the provider query. A `CONTAINS` with a list of terms
/// combines the terms the way the field's search binding joins them.
fn matches_prefilters(
    schema: &NativeSchema,
    record: &NativeRecord,
    prefilters: &[Condition],
) -> bool {
    prefilters.iter().all(|cond| match (cond.op, &cond.value) {
        (Operator::Contains, Value::Array(terms)) => {
            let join = schema
                .field(&cond.field)
                .and_then(|f| f.search())
                .map_or(BoolJoin::Or, |b| b.value_join);
            let mut hits = terms.iter().map(|term| {
                matches(
                    record,
                    &Condition::new(cond.field.clone(), Operator::Contains, term.clone()),
                )
            });
            match join {
                BoolJoin::Or => hits.any(|hit| hit),
                BoolJoin::And => hits.all(|hit| hit),
            }
        }
        _ => matches(record, cond),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse_a::WAREHOUSE_A_JOB_SCHEMA;
    use hrsync_core::Operator;
    use serde_json::json;

    fn job(id: &str, updated: &str, board: &str) -> NativeRecord {
        NativeRecord::from_value(json!({
            "job_id": id,
            "job_title": format!("Job {id}"),
            "board_key": board,
            "last_modified": updated,
            "created_on": "2024-01-01T00:00:00Z",
            "payload": {}
        }))
        .unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                vec![
                    job("j3", "2024-03-01", "b1"),
                    job("j1", "2024-01-01", "b2"),
                    job("j2", "2024-02-01", "b1"),
                    job("j4", "2024-04-01", "b2"),
                ],
            )
            .await
            .unwrap();
        store
    }

    fn ids(batch: &ReadBatch) -> Vec<String> {
        batch
            .records
            .iter()
            .map(|r| r.get("job_id").and_then(|v| v.as_str()).unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = seeded().await;
        store
            .upsert(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                vec![job("j1", "2024-05-01", "b9")],
            )
            .await
            .unwrap();
        assert_eq!(store.len(Resource::Job).await, 4);
        let found = store
            .get_many(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, &["j1".to_string()])
            .await
            .unwrap();
        assert_eq!(found[0].get("board_key"), Some(&json!("b9")));
    }

    #[tokio::test]
    async fn test_upsert_without_id_fails() {
        let store = InMemoryStore::new();
        let record = NativeRecord::from_value(json!({"job_title": "x"})).unwrap();
        let err = store
            .upsert(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, vec![record])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
    }

    #[tokio::test]
    async fn test_page_ascending_with_next() {
        let store = seeded().await;
        let cursor = Cursor::new(CursorMode::UpdatedAt);
        let first = store
            .page(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, &[], &cursor, 2)
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["j1", "j2"]);
        assert_eq!(first.next.as_deref(), Some(r#"["2024-02-01","j2"]"#));

        let second = store
            .page(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                &[],
                &cursor.at(first.next.clone()),
                2,
            )
            .await
            .unwrap();
        assert_eq!(ids(&second), vec!["j3", "j4"]);

        let third = store
            .page(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                &[],
                &cursor.at(second.next.clone()),
                2,
            )
            .await
            .unwrap();
        assert!(third.is_empty());
        assert_eq!(third.next, None);
    }

    #[tokio::test]
    async fn test_page_partial_has_no_next() {
        let store = seeded().await;
        let cursor = Cursor::new(CursorMode::Id).starting_at("j2");
        let batch = store
            .page(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, &[], &cursor, 5)
            .await
            .unwrap();
        // a caller-supplied start is inclusive
        assert_eq!(ids(&batch), vec!["j2", "j3", "j4"]);
        assert_eq!(batch.next, None);
    }

    #[tokio::test]
    async fn test_page_descending() {
        let store = seeded().await;
        let cursor = Cursor::new(CursorMode::Id).starting_at("j4").descending();
        let batch = store
            .page(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, &[], &cursor, 10)
            .await
            .unwrap();
        assert_eq!(ids(&batch), vec!["j4", "j3", "j2", "j1"]);
    }

    async fn read_all(store: &InMemoryStore, cursor: Cursor, batch_size: usize) -> Vec<String> {
        let mut seen = Vec::new();
        let mut position = cursor.start.clone();
        loop {
            let batch = store
                .page(
                    &WAREHOUSE_A_JOB_SCHEMA,
                    Resource::Job,
                    &[],
                    &cursor.at(position.clone()),
                    batch_size,
                )
                .await
                .unwrap();
            seen.extend(ids(&batch));
            match batch.next {
                Some(next) => position = Some(next),
                None => return seen,
            }
        }
    }

    #[tokio::test]
    async fn test_ties_across_page_boundary_are_all_read() {
        let store = InMemoryStore::new();
        store
            .upsert(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                vec![
                    job("a", "2024-01-01", "b1"),
                    job("b", "2024-01-02", "b1"),
                    job("c", "2024-01-02", "b1"),
                    job("d", "2024-01-03", "b1"),
                ],
            )
            .await
            .unwrap();

        let forward = read_all(&store, Cursor::new(CursorMode::UpdatedAt), 2).await;
        assert_eq!(forward, vec!["a", "b", "c", "d"]);

        let backward = read_all(
            &store,
            Cursor::new(CursorMode::UpdatedAt)
                .starting_at("2024-01-03")
                .descending(),
            1,
        )
        .await;
        assert_eq!(backward, vec!["d", "c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_page_larger_tie_group_than_batch() {
        let store = InMemoryStore::new();
        store
            .upsert(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                (1..=5)
                    .map(|n| job(&format!("t{n}"), "2024-06-01", "b1"))
                    .collect(),
            )
            .await
            .unwrap();

        let all = read_all(&store, Cursor::new(CursorMode::UpdatedAt), 2).await;
        assert_eq!(all, vec!["t1", "t2", "t3", "t4", "t5"]);
    }

    #[test]
    fn test_resume_parse() {
        assert_eq!(
            Resume::parse("2024-01-02"),
            Resume::At("2024-01-02".to_string())
        );
        let token = Resume::token("2024-01-02", "c").unwrap();
        assert_eq!(
            Resume::parse(&token),
            Resume::After("2024-01-02".to_string(), "c".to_string())
        );
    }

    #[tokio::test]
    async fn test_page_end_bound_inclusive() {
        let store = seeded().await;
        let mut cursor = Cursor::new(CursorMode::UpdatedAt);
        cursor.end = Some("2024-02-01".to_string());
        let batch = store
            .page(&WAREHOUSE_A_JOB_SCHEMA, Resource::Job, &[], &cursor, 10)
            .await
            .unwrap();
        assert_eq!(ids(&batch), vec!["j1", "j2"]);
    }

    #[tokio::test]
    async fn test_page_applies_prefilters() {
        let store = seeded().await;
        let prefilters = vec![Condition::new("board_key", Operator::In, json!(["b2"]))];
        let batch = store
            .page(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                &prefilters,
                &Cursor::new(CursorMode::Id),
                10,
            )
            .await
            .unwrap();
        assert_eq!(ids(&batch), vec!["j1", "j4"]);
    }

    #[tokio::test]
    async fn test_contains_list_prefilter_matches_any_term() {
        let store = seeded().await;
        let prefilters = vec![Condition::new(
            "job_title",
            Operator::Contains,
            json!(["j2", "j4"]),
        )];
        let batch = store
            .page(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                &prefilters,
                &Cursor::new(CursorMode::Id),
                10,
            )
            .await
            .unwrap();
        assert_eq!(ids(&batch), vec!["j2", "j4"]);
    }

    #[tokio::test]
    async fn test_page_range_on_unbound_field_fails() {
        let store = seeded().await;
        let prefilters = vec![Condition::new("job_title", Operator::Gt, "A")];
        let err = store
            .page(
                &WAREHOUSE_A_JOB_SCHEMA,
                Resource::Job,
                &prefilters,
                &Cursor::new(CursorMode::Id),
                10,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = seeded().await;
        store.save(&path).await.unwrap();

        let loaded = InMemoryStore::load(&path).await.unwrap();
        assert_eq!(loaded.len(Resource::Job).await, 4);
        assert!(loaded.is_empty(Resource::Profile).await);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::load(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(store.is_empty(Resource::Job).await);
    }
}
