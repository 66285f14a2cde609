//! Resource kinds and warehouse categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// The kind of entity being synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Job,
    Profile,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Job => "job",
            Resource::Profile => "profile",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(Resource::Job),
            "profile" => Ok(Resource::Profile),
            other => Err(SyncError::configuration(format!(
                "unsupported resource: {}",
                other
            ))),
        }
    }
}

/// Category of the external system behind a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseType {
    Ats,
    Crm,
    Jobboard,
    Hcm,
    Customers,
}

impl WarehouseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseType::Ats => "ats",
            WarehouseType::Crm => "crm",
            WarehouseType::Jobboard => "jobboard",
            WarehouseType::Hcm => "hcm",
            WarehouseType::Customers => "customers",
        }
    }
}
