//! End-to-end pull/push runs between in-memory warehouses.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use hrsync_connectors::{Connector, InMemoryStore, ReadBatch, WarehouseAConnector};
use hrsync_core::{
    Condition, Cursor, CursorMode, EventKind, NativeRecord, NativeSchema, Operator, Resource,
    Result, SyncError, UnifiedEvent, UnifiedRecord, WarehouseType,
};
use hrsync_engine::{PullJob, PushInput, PushJob};

fn job(id: &str, day: u32, status: &str) -> NativeRecord {
    NativeRecord::from_value(json!({
        "job_id": id,
        "job_title": format!("Job {}", id),
        "board_key": "main",
        "last_modified": format!("2024-02-{:02}T09:00:00Z", day),
        "created_on": "2024-01-01T00:00:00Z",
        "payload": {"status": status}
    }))
    .unwrap()
}

fn event(n: u32, job_id: &str) -> UnifiedEvent {
    UnifiedEvent {
        event_id: format!("evt-{}", n),
        resource: Resource::Job,
        resource_id: job_id.to_string(),
        kind: EventKind::Updated,
        occurred_at: None,
        payload: Value::Null,
    }
}

fn warehouse(name: &str) -> (WarehouseAConnector, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (WarehouseAConnector::new(name, store.clone()), store)
}

/// Delegates to a warehouse but fails event fetches that include `poisoned`.
struct FlakyOrigin {
    inner: WarehouseAConnector,
    poisoned: String,
}

#[async_trait]
impl Connector for FlakyOrigin {
    fn name(&self) -> &str {
        "flaky"
    }

    fn warehouse_type(&self) -> WarehouseType {
        self.inner.warehouse_type()
    }

    fn schema(&self, resource: Resource) -> Result<&'static NativeSchema> {
        self.inner.schema(resource)
    }

    async fn read_batch(
        &self,
        resource: Resource,
        prefilters: &[Condition],
        cursor: &Cursor,
        batch_size: usize,
    ) -> Result<ReadBatch> {
        self.inner
            .read_batch(resource, prefilters, cursor, batch_size)
            .await
    }

    async fn write_native_batch(
        &self,
        resource: Resource,
        records: Vec<NativeRecord>,
    ) -> Result<()> {
        self.inner.write_native_batch(resource, records).await
    }

    async fn fetch_by_event_ids(
        &self,
        resource: Resource,
        ids: &[String],
    ) -> Result<Vec<NativeRecord>> {
        if ids.contains(&self.poisoned) {
            return Err(SyncError::Fetch(format!("lookup of {} timed out", self.poisoned)));
        }
        self.inner.fetch_by_event_ids(resource, ids).await
    }

    fn to_unified(&self, resource: Resource, record: &NativeRecord) -> Result<UnifiedRecord> {
        self.inner.to_unified(resource, record)
    }

    fn from_unified(&self, resource: Resource, unified: UnifiedRecord) -> Result<NativeRecord> {
        self.inner.from_unified(resource, unified)
    }
}

#[tokio::test]
async fn events_push_counts_missing_and_filtered() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(Resource::Job, vec![job("a", 1, "open"), job("b", 2, "closed")])
        .await
        .unwrap();

    let events = vec![event(1, "a"), event(2, "b"), event(3, "deleted-long-ago")];
    let result = PushJob::new(Resource::Job, &origin, &target)
        .postfilters(vec![Condition::new("payload.status", Operator::Eq, "open")])
        .run(PushInput::Events(events))
        .await
        .unwrap();

    assert_eq!(result.total_events, 3);
    assert_eq!(result.total_resources_fetched, 2);
    assert_eq!(result.skipped_missing, 1);
    assert_eq!(result.skipped_having, 1);
    assert_eq!(result.total_resources_pushed, 1);
    assert!(result.errors.is_empty());
    assert_eq!(target_store.len(Resource::Job).await, 1);
}

#[tokio::test]
async fn events_dry_run_counts_without_writing() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(Resource::Job, vec![job("a", 1, "open"), job("b", 2, "closed")])
        .await
        .unwrap();

    let events = vec![event(1, "a"), event(2, "b"), event(3, "gone")];
    let result = PushJob::new(Resource::Job, &origin, &target)
        .postfilters(vec![Condition::new("payload.status", Operator::Eq, "open")])
        .dry_run(true)
        .run(PushInput::Events(events))
        .await
        .unwrap();

    assert_eq!(result.total_events, 3);
    assert_eq!(result.total_resources_fetched, 2);
    assert_eq!(result.skipped_missing, 1);
    assert_eq!(result.skipped_having, 1);
    assert_eq!(result.total_resources_pushed, 1);
    assert!(target_store.is_empty(Resource::Job).await);
}

#[tokio::test]
async fn failed_event_fetch_skips_only_that_batch() {
    let (inner, _) = warehouse("origin");
    inner
        .write_native_batch(Resource::Job, vec![job("a", 1, "open"), job("c", 3, "open")])
        .await
        .unwrap();
    let origin = FlakyOrigin {
        inner,
        poisoned: "b".to_string(),
    };
    let (target, target_store) = warehouse("target");

    // batches: [a, b] fails, [c] succeeds
    let result = PushJob::new(Resource::Job, &origin, &target)
        .batch_size(2)
        .run(PushInput::Events(vec![event(1, "a"), event(2, "b"), event(3, "c")]))
        .await
        .unwrap();

    assert_eq!(result.total_events, 3);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("timed out"));
    assert_eq!(result.total_resources_pushed, 1);
    assert_eq!(target_store.len(Resource::Job).await, 1);
}

#[tokio::test]
async fn resources_push_is_repeatable() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    let records: Vec<_> = (1..=5).map(|n| job(&format!("r{}", n), n, "open")).collect();

    let push = PushJob::new(Resource::Job, &origin, &target).batch_size(2);
    let first = push
        .run(PushInput::Resources(records.clone()))
        .await
        .unwrap();
    let second = push.run(PushInput::Resources(records)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total_resources_fetched, 5);
    assert_eq!(first.total_resources_pushed, 5);
    assert_eq!(target_store.len(Resource::Job).await, 5);
}

#[tokio::test]
async fn pull_resumes_monotonically() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(
            Resource::Job,
            (1..=6).map(|n| job(&format!("j{}", n), n, "open")).collect(),
        )
        .await
        .unwrap();

    let first = PullJob::new(Resource::Job, &origin, &target)
        .batch_size(4)
        .run(&Cursor::new(CursorMode::UpdatedAt))
        .await
        .unwrap();
    let first_end = first.end.clone().unwrap();
    assert_eq!(first_end, "2024-02-06T09:00:00Z");

    origin
        .write_native_batch(Resource::Job, vec![job("j7", 7, "open"), job("j8", 8, "open")])
        .await
        .unwrap();

    let second = PullJob::new(Resource::Job, &origin, &target)
        .batch_size(4)
        .run(&first.resume())
        .await
        .unwrap();
    assert_eq!(second.start.as_deref(), Some(first_end.as_str()));
    let second_end = second.end.unwrap();
    assert!(second_end > first_end);
    assert_eq!(target_store.len(Resource::Job).await, 8);
}

#[tokio::test]
async fn pull_past_every_record_reads_nothing() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(Resource::Job, vec![job("j1", 1, "open")])
        .await
        .unwrap();

    let cursor = Cursor::new(CursorMode::UpdatedAt).starting_at("2024-02-02T00:00:00Z");
    let out = PullJob::new(Resource::Job, &origin, &target)
        .run(&cursor)
        .await
        .unwrap();

    assert_eq!(out.start, cursor.start);
    assert_eq!(out.end, None);
    assert!(target_store.is_empty(Resource::Job).await);
}

#[tokio::test]
async fn pull_resumed_at_end_rereads_only_that_position() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(Resource::Job, vec![job("j1", 1, "open")])
        .await
        .unwrap();

    let cursor = Cursor::new(CursorMode::UpdatedAt).starting_at("2024-02-01T09:00:00Z");
    let out = PullJob::new(Resource::Job, &origin, &target)
        .run(&cursor)
        .await
        .unwrap();

    assert_eq!(out.end.as_deref(), Some("2024-02-01T09:00:00Z"));
    assert_eq!(target_store.len(Resource::Job).await, 1);
}

#[tokio::test]
async fn pull_descending_walks_backwards() {
    let (origin, _) = warehouse("origin");
    let (target, target_store) = warehouse("target");
    origin
        .write_native_batch(
            Resource::Job,
            (1..=5).map(|n| job(&format!("j{}", n), n, "open")).collect(),
        )
        .await
        .unwrap();

    let cursor = Cursor::new(CursorMode::UpdatedAt)
        .starting_at("2024-02-04T09:00:00Z")
        .descending();
    let out = PullJob::new(Resource::Job, &origin, &target)
        .batch_size(2)
        .run(&cursor)
        .await
        .unwrap();

    assert_eq!(out.end.as_deref(), Some("2024-02-01T09:00:00Z"));
    assert_eq!(target_store.len(Resource::Job).await, 4);
}
