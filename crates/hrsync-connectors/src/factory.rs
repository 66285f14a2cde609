//! Connector factory: named connector registration with lazy instances.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use hrsync_core::{Resource, Result, SyncError, WarehouseType};

use crate::Connector;

/// What a registered connector is, for listings and UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorMeta {
    pub name: String,
    pub label: String,
    pub warehouse_type: WarehouseType,
    pub resources: Vec<Resource>,
}

/// Builds one named connector.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    fn meta(&self) -> ConnectorMeta;

    async fn build(&self) -> Result<Arc<dyn Connector>>;
}

/// Registry of connector factories, keyed by connector name.
///
/// Instances are built on first use and shared afterwards.
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, Arc<dyn ConnectorFactory>>,
    instances: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its meta name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) -> &mut Self {
        let name = factory.meta().name;
        self.factories.insert(name, factory);
        self
    }

    pub fn list(&self) -> Vec<ConnectorMeta> {
        self.factories.values().map(|f| f.meta()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<dyn Connector>> {
        if let Some(existing) = self.instances.read().await.get(name) {
            return Ok(existing.clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SyncError::configuration(format!("unknown connector: {}", name)))?;

        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(name) {
            return Ok(existing.clone());
        }
        let connector = factory.build().await?;
        info!("Built connector '{}'", name);
        instances.insert(name.to_string(), connector.clone());
        Ok(connector)
    }
}
