//! Incremental pull: page through the origin, filter, format, write.

use std::collections::HashSet;
use tracing::{debug, info};

use hrsync_connectors::Connector;
use hrsync_core::{
    apply_postfilters, validate_prefilters, Condition, Cursor, NativeRecord, Resource, Result,
    SyncError,
};

use crate::formatter::{deliver, Formatter};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// One pull from `origin` into `target`.
pub struct PullJob<'a> {
    resource: Resource,
    origin: &'a dyn Connector,
    target: &'a dyn Connector,
    /// Pushed down to the origin's query.
    prefilters: Vec<Condition>,
    /// Evaluated locally on each page.
    postfilters: Vec<Condition>,
    formatter: Option<&'a dyn Formatter>,
    batch_size: usize,
    dry_run: bool,
}

impl<'a> PullJob<'a> {
    pub fn new(resource: Resource, origin: &'a dyn Connector, target: &'a dyn Connector) -> Self {
        Self {
            resource,
            origin,
            target,
            prefilters: Vec::new(),
            postfilters: Vec::new(),
            formatter: None,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    pub fn prefilters(mut self, conditions: Vec<Condition>) -> Self {
        self.prefilters = conditions;
        self
    }

    pub fn postfilters(mut self, conditions: Vec<Condition>) -> Self {
        self.postfilters = conditions;
        self
    }

    pub fn formatter(mut self, formatter: &'a dyn Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run from `cursor.start` until the origin reports no further page.
    ///
    /// The returned cursor keeps `mode`, `start` and `sort_by`; `end` is the
    /// position of the last record read (before postfiltering), or `None`
    /// when nothing was read. Resume with [`Cursor::resume`]. Origins treat a
    /// start position as inclusive, so a resumed run reads the records at
    /// `end` again.
    ///
    /// Records the previous page already returned at the current position are
    /// not delivered twice. An origin that hands back the position it was
    /// read at cannot make progress (a full page sharing one cursor value);
    /// the run then fails with a connector error rather than stopping early.
    pub async fn run(&self, cursor: &Cursor) -> Result<Cursor> {
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch_size must be at least 1"));
        }
        validate_prefilters(self.origin.schema(self.resource)?, &self.prefilters)?;

        info!(
            "Pull {}: {} -> {} by {} from {:?}{}",
            self.resource,
            self.origin.name(),
            self.target.name(),
            cursor.mode,
            cursor.start,
            if self.dry_run { " (dry run)" } else { "" }
        );

        let mut position = cursor.start.clone();
        // ids read at `position` on the previous page
        let mut boundary: HashSet<String> = HashSet::new();
        let mut end: Option<String> = None;
        let (mut batches, mut read, mut written) = (0usize, 0usize, 0usize);

        loop {
            let page = self
                .origin
                .read_batch(
                    self.resource,
                    &self.prefilters,
                    &cursor.at(position.clone()),
                    self.batch_size,
                )
                .await?;
            if page.is_empty() {
                break;
            }
            batches += 1;
            read += page.records.len();

            if let Some(last) = page.records.last() {
                if let Some(value) = self.origin.extract_cursor(self.resource, last, cursor.mode)? {
                    end = Some(value);
                }
            }

            let next = page.next;
            if let Some(next) = &next {
                if position.as_deref() == Some(next.as_str()) {
                    return Err(SyncError::Connector(format!(
                        "{} returned a full page of {} at position {} without advancing; \
                         raise batch_size or page by id",
                        self.origin.name(),
                        self.resource,
                        next
                    )));
                }
            }

            let next_boundary = match &next {
                Some(next) => self.ids_at(&page.records, cursor, next)?,
                None => HashSet::new(),
            };
            let fresh = match &position {
                Some(at) if !boundary.is_empty() => {
                    self.without_seen(page.records, cursor, at, &boundary)?
                }
                _ => page.records,
            };

            let survivors = apply_postfilters(fresh, &self.postfilters);
            debug!(
                "Pull {}: batch {} kept {} record(s), next {:?}",
                self.resource,
                batches,
                survivors.len(),
                next
            );
            written += deliver(
                self.resource,
                self.origin,
                self.target,
                self.formatter,
                &survivors,
                self.dry_run,
            )
            .await?;

            match next {
                None => break,
                Some(next) => {
                    position = Some(next);
                    boundary = next_boundary;
                }
            }
        }

        info!(
            "Pull {} finished: {} batch(es), {} read, {} written, end {:?}",
            self.resource, batches, read, written, end
        );

        Ok(Cursor {
            mode: cursor.mode,
            start: cursor.start.clone(),
            end,
            sort_by: cursor.sort_by,
        })
    }

    /// Ids of the records whose cursor value is `position`.
    fn ids_at(
        &self,
        records: &[NativeRecord],
        cursor: &Cursor,
        position: &str,
    ) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        for record in records {
            let value = self.origin.extract_cursor(self.resource, record, cursor.mode)?;
            if value.as_deref() == Some(position) {
                ids.insert(self.origin.get_id(self.resource, record)?);
            }
        }
        Ok(ids)
    }

    fn without_seen(
        &self,
        records: Vec<NativeRecord>,
        cursor: &Cursor,
        position: &str,
        seen: &HashSet<String>,
    ) -> Result<Vec<NativeRecord>> {
        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            let value = self.origin.extract_cursor(self.resource, &record, cursor.mode)?;
            if value.as_deref() == Some(position)
                && seen.contains(&self.origin.get_id(self.resource, &record)?)
            {
                continue;
            }
            fresh.push(record);
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{FormatOutput, MappingFormatter, MappingSpec};
    use async_trait::async_trait;
    use hrsync_connectors::{InMemoryStore, ReadBatch, WarehouseAConnector};
    use hrsync_core::{CursorMode, NativeSchema, Operator, UnifiedRecord, WarehouseType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn job(n: u32, status: &str) -> NativeRecord {
        NativeRecord::from_value(json!({
            "job_id": format!("j-{:02}", n),
            "job_title": format!("Job {}", n),
            "board_key": if n % 2 == 0 { "even" } else { "odd" },
            "last_modified": format!("2024-01-{:02}T00:00:00Z", n),
            "payload": {"status": status}
        }))
        .unwrap()
    }

    async fn seeded(records: Vec<NativeRecord>) -> WarehouseAConnector {
        let store = Arc::new(InMemoryStore::new());
        let connector = WarehouseAConnector::new("origin", store);
        connector
            .write_native_batch(Resource::Job, records)
            .await
            .unwrap();
        connector
    }

    fn empty_target() -> (WarehouseAConnector, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (WarehouseAConnector::new("target", store.clone()), store)
    }

    #[tokio::test]
    async fn test_pull_copies_everything_across_pages() {
        let origin = seeded((1..=5).map(|n| job(n, "open")).collect()).await;
        let (target, store) = empty_target();

        let cursor = Cursor::new(CursorMode::UpdatedAt);
        let out = PullJob::new(Resource::Job, &origin, &target)
            .batch_size(2)
            .run(&cursor)
            .await
            .unwrap();

        assert_eq!(out.start, None);
        assert_eq!(out.end.as_deref(), Some("2024-01-05T00:00:00Z"));
        assert_eq!(store.len(Resource::Job).await, 5);
    }

    #[tokio::test]
    async fn test_prefilters_validated_before_reading() {
        let origin = seeded(vec![job(1, "open")]).await;
        let (target, store) = empty_target();

        // payload allows no operators
        let err = PullJob::new(Resource::Job, &origin, &target)
            .prefilters(vec![Condition::new("payload", Operator::Eq, "x")])
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(store.is_empty(Resource::Job).await);
    }

    #[tokio::test]
    async fn test_prefilters_are_pushed_down() {
        let origin = seeded((1..=6).map(|n| job(n, "open")).collect()).await;
        let (target, store) = empty_target();

        PullJob::new(Resource::Job, &origin, &target)
            .prefilters(vec![Condition::new("board_key", Operator::In, json!(["even"]))])
            .batch_size(2)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(store.len(Resource::Job).await, 3);
    }

    #[tokio::test]
    async fn test_filtered_tail_does_not_regress_end() {
        // The last record read is closed; end still points at it.
        let origin = seeded(vec![job(1, "open"), job(2, "open"), job(3, "closed")]).await;
        let (target, store) = empty_target();

        let out = PullJob::new(Resource::Job, &origin, &target)
            .postfilters(vec![Condition::new("payload.status", Operator::Eq, "open")])
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(out.end.as_deref(), Some("2024-01-03T00:00:00Z"));
        assert_eq!(store.len(Resource::Job).await, 2);
    }

    #[tokio::test]
    async fn test_fully_filtered_page_keeps_paging() {
        let origin = seeded(vec![
            job(1, "closed"),
            job(2, "closed"),
            job(3, "open"),
        ])
        .await;
        let (target, store) = empty_target();

        let out = PullJob::new(Resource::Job, &origin, &target)
            .postfilters(vec![Condition::new("payload.status", Operator::Eq, "open")])
            .batch_size(2)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(store.len(Resource::Job).await, 1);
        assert_eq!(out.end.as_deref(), Some("2024-01-03T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_dry_run_reads_but_does_not_write() {
        let origin = seeded((1..=3).map(|n| job(n, "open")).collect()).await;
        let (target, store) = empty_target();

        let out = PullJob::new(Resource::Job, &origin, &target)
            .dry_run(true)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();
        assert_eq!(out.end.as_deref(), Some("2024-01-03T00:00:00Z"));
        assert!(store.is_empty(Resource::Job).await);
    }

    #[tokio::test]
    async fn test_explicit_formatter_writes_native() {
        let origin = seeded(vec![job(1, "open")]).await;
        let (target, store) = empty_target();
        let mapping = MappingFormatter::new(vec![
            MappingSpec::new("job_id", "job_id"),
            MappingSpec::new("payload.status", "job_title"),
        ]);

        PullJob::new(Resource::Job, &origin, &target)
            .formatter(&mapping)
            .run(&Cursor::new(CursorMode::Id))
            .await
            .unwrap();

        let written = store.all(Resource::Job).await;
        assert_eq!(written[0].get("job_title"), Some(&json!("open")));
    }

    #[tokio::test]
    async fn test_format_error_aborts_pull() {
        let origin = seeded(vec![job(1, "open")]).await;
        let (target, store) = empty_target();
        let failing = |_: &NativeRecord| -> Result<FormatOutput> {
            Err(SyncError::format("no mapping for this record"))
        };

        let err = PullJob::new(Resource::Job, &origin, &target)
            .formatter(&failing)
            .run(&Cursor::new(CursorMode::Id))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
        assert!(store.is_empty(Resource::Job).await);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let origin = seeded(vec![]).await;
        let (target, _) = empty_target();
        let err = PullJob::new(Resource::Job, &origin, &target)
            .batch_size(0)
            .run(&Cursor::new(CursorMode::Id))
            .await
            .unwrap_err();
        assert!(err.is_fatal_setup());
    }

    fn job_on(id: &str, day: u32) -> NativeRecord {
        NativeRecord::from_value(json!({
            "job_id": id,
            "job_title": id,
            "last_modified": format!("2024-05-{:02}T00:00:00Z", day),
        }))
        .unwrap()
    }

    /// Pages like a provider API: the start bound is inclusive and `next` is
    /// the cursor value of the last record on a full page.
    struct InclusiveOrigin {
        inner: WarehouseAConnector,
        store: Arc<InMemoryStore>,
    }

    impl InclusiveOrigin {
        async fn with(records: Vec<NativeRecord>) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let inner = WarehouseAConnector::new("inclusive", store.clone());
            inner.write_native_batch(Resource::Job, records).await.unwrap();
            Self { inner, store }
        }
    }

    #[async_trait]
    impl Connector for InclusiveOrigin {
        fn name(&self) -> &str {
            "inclusive"
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
            _prefilters: &[Condition],
            cursor: &Cursor,
            batch_size: usize,
        ) -> Result<ReadBatch> {
            let mut rows = Vec::new();
            for record in self.store.all(resource).await {
                let Some(position) = self.extract_cursor(resource, &record, cursor.mode)? else {
                    continue;
                };
                if cursor.start.as_deref().map_or(true, |s| position.as_str() >= s) {
                    let id = self.get_id(resource, &record)?;
                    rows.push((position, id, record));
                }
            }
            rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
            rows.truncate(batch_size);
            let next = match rows.last() {
                Some((position, _, _)) if rows.len() == batch_size => Some(position.clone()),
                _ => None,
            };
            Ok(ReadBatch::new(rows.into_iter().map(|r| r.2).collect(), next))
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
    async fn test_tied_records_across_pages_are_all_written() {
        let origin = seeded(vec![
            job_on("a", 1),
            job_on("b", 2),
            job_on("c", 2),
            job_on("d", 3),
        ])
        .await;
        let (target, store) = empty_target();

        let out = PullJob::new(Resource::Job, &origin, &target)
            .batch_size(2)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();

        assert_eq!(out.end.as_deref(), Some("2024-05-03T00:00:00Z"));
        assert_eq!(store.len(Resource::Job).await, 4);
    }

    #[tokio::test]
    async fn test_inclusive_origin_delivers_each_record_once() {
        let origin =
            InclusiveOrigin::with((1..=4).map(|n| job_on(&format!("r{}", n), n)).collect()).await;
        let (target, store) = empty_target();
        let formatted = AtomicUsize::new(0);
        let counting = |record: &NativeRecord| -> Result<FormatOutput> {
            formatted.fetch_add(1, Ordering::SeqCst);
            Ok(FormatOutput::Native(record.clone()))
        };

        // pages: [r1 r2] [r2 r3] [r3 r4] [r4]
        let out = PullJob::new(Resource::Job, &origin, &target)
            .formatter(&counting)
            .batch_size(2)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap();

        assert_eq!(out.end.as_deref(), Some("2024-05-04T00:00:00Z"));
        assert_eq!(formatted.load(Ordering::SeqCst), 4);
        assert_eq!(store.len(Resource::Job).await, 4);
    }

    #[tokio::test]
    async fn test_page_that_cannot_advance_fails() {
        let origin =
            InclusiveOrigin::with(vec![job_on("t1", 9), job_on("t2", 9), job_on("t3", 9)]).await;
        let (target, _) = empty_target();

        let err = PullJob::new(Resource::Job, &origin, &target)
            .batch_size(2)
            .run(&Cursor::new(CursorMode::UpdatedAt))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connector(_)));
        assert!(err.to_string().contains("without advancing"));
    }
}
