//! Connector framework ID types
//!
//! Newtype wrappers for type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a single harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarvestRunId(Uuid);

impl HarvestRunId {
    /// Create a new random `HarvestRunId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `HarvestRunId` from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for HarvestRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HarvestRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HarvestRunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for HarvestRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<HarvestRunId> for Uuid {
    fn from(id: HarvestRunId) -> Self {
        id.0
    }
}
