//! Push: deliver records named by change events, or given explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use hrsync_connectors::Connector;
use hrsync_core::{
    apply_postfilters, matches_all, Condition, NativeRecord, Resource, Result, SyncError,
    UnifiedEvent,
};

use crate::formatter::{deliver, Formatter};
use crate::pull::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    Events,
    Resources,
}

/// What to push.
#[derive(Debug, Clone)]
pub enum PushInput {
    /// Change events; records are fetched from the origin by resource id.
    Events(Vec<UnifiedEvent>),
    /// Origin-native records, pushed as given.
    Resources(Vec<NativeRecord>),
}

impl PushInput {
    pub fn mode(&self) -> PushMode {
        match self {
            PushInput::Events(_) => PushMode::Events,
            PushInput::Resources(_) => PushMode::Resources,
        }
    }
}

/// Counters for one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub total_events: usize,
    pub total_resources_fetched: usize,
    /// Records written, or that would have been written on a dry run.
    pub total_resources_pushed: usize,
    pub skipped_missing: usize,
    pub skipped_having: usize,
    pub errors: Vec<String>,
}

/// One push from `origin` into `target`.
pub struct PushJob<'a> {
    resource: Resource,
    origin: &'a dyn Connector,
    target: &'a dyn Connector,
    postfilters: Vec<Condition>,
    formatter: Option<&'a dyn Formatter>,
    batch_size: usize,
    dry_run: bool,
    /// When false, every missing record also adds an entry to `errors`.
    ignore_missing: bool,
}

impl<'a> PushJob<'a> {
    pub fn new(resource: Resource, origin: &'a dyn Connector, target: &'a dyn Connector) -> Self {
        Self {
            resource,
            origin,
            target,
            postfilters: Vec::new(),
            formatter: None,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            ignore_missing: true,
        }
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

    pub fn ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }

    pub async fn run(&self, input: PushInput) -> Result<PushResult> {
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch_size must be at least 1"));
        }
        info!(
            "Push {} ({:?}): {} -> {}{}",
            self.resource,
            input.mode(),
            self.origin.name(),
            self.target.name(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        let result = match input {
            PushInput::Events(events) => self.push_events(events).await?,
            PushInput::Resources(records) => self.push_resources(records).await?,
        };

        info!(
            "Push {} finished: {} fetched, {} pushed, {} missing, {} filtered, {} error(s)",
            self.resource,
            result.total_resources_fetched,
            result.total_resources_pushed,
            result.skipped_missing,
            result.skipped_having,
            result.errors.len()
        );
        Ok(result)
    }

    async fn push_events(&self, events: Vec<UnifiedEvent>) -> Result<PushResult> {
        if let Some(other) = events.iter().find(|e| e.resource != self.resource) {
            return Err(SyncError::validation(format!(
                "event {} is a {} event, expected {}",
                other.event_id, other.resource, self.resource
            )));
        }

        let mut result = PushResult {
            total_events: events.len(),
            ..Default::default()
        };

        for (index, batch) in events.chunks(self.batch_size).enumerate() {
            let ids: Vec<String> = batch.iter().map(|e| e.resource_id.clone()).collect();
            let fetched = match self.origin.fetch_by_event_ids(self.resource, &ids).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Push {}: skipping event batch {}: {}", self.resource, index, e);
                    result.errors.push(e.to_string());
                    continue;
                }
            };

            let mut by_id = HashMap::with_capacity(fetched.len());
            for record in fetched {
                by_id.insert(self.origin.get_id(self.resource, &record)?, record);
            }

            let mut survivors = Vec::with_capacity(batch.len());
            for event in batch {
                let Some(record) = by_id.get(&event.resource_id) else {
                    result.skipped_missing += 1;
                    if !self.ignore_missing {
                        result.errors.push(format!(
                            "missing {} for event {} ({}_id={})",
                            self.resource, event.event_id, self.resource, event.resource_id
                        ));
                    }
                    continue;
                };
                result.total_resources_fetched += 1;
                if matches_all(record, &self.postfilters) {
                    survivors.push(record.clone());
                } else {
                    result.skipped_having += 1;
                }
            }

            debug!(
                "Push {}: event batch {} resolved {} of {}",
                self.resource,
                index,
                survivors.len(),
                batch.len()
            );
            result.total_resources_pushed += deliver(
                self.resource,
                self.origin,
                self.target,
                self.formatter,
                &survivors,
                self.dry_run,
            )
            .await?;
        }
        Ok(result)
    }

    async fn push_resources(&self, records: Vec<NativeRecord>) -> Result<PushResult> {
        let mut result = PushResult {
            total_resources_fetched: records.len(),
            ..Default::default()
        };

        for batch in records.chunks(self.batch_size) {
            let survivors = apply_postfilters(batch.to_vec(), &self.postfilters);
            result.skipped_having += batch.len() - survivors.len();
            result.total_resources_pushed += deliver(
                self.resource,
                self.origin,
                self.target,
                self.formatter,
                &survivors,
                self.dry_run,
            )
            .await?;
        }
        Ok(result)
    }
}
