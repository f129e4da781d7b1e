use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 4;

/// A state snapshot for one workspace.
///
/// A snapshot with no managed resources is "empty"; migration skips empty
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Incremented on every write through an operation.
    pub serial: u64,
    /// Stable identity of the state across serials.
    pub lineage: String,
    #[serde(default)]
    pub resources: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Create an empty snapshot with a fresh lineage.
    pub fn new() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            serial: 0,
            lineage: Uuid::new_v4().to_string(),
            resources: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, address: impl Into<String>, attributes: Value) -> Self {
        self.resources.insert(address.into(), attributes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}
