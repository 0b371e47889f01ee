//! snapshot.rs
//! An in-memory dataset layout, loadable from JSON.

use super::{DatasetLayout, EntityFilter, EntityKey, UnitMetadata};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serialized form of a single run in a snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub entities: EntityKey,
    #[serde(default)]
    pub metadata: Option<UnitMetadata>,
}

/// A frozen view of a dataset: every run key, in indexing order, with its metadata.
///
/// Re-adding a key replaces its metadata but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RunRecord>", into = "Vec<RunRecord>")]
pub struct LayoutSnapshot {
    runs: IndexMap<EntityKey, Option<UnitMetadata>>,
}

impl LayoutSnapshot {
    pub fn new() -> Self { Self::default() }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn add_run(&mut self, key: EntityKey, metadata: Option<UnitMetadata>) {
        self.runs.insert(key, metadata);
    }

    pub fn len(&self) -> usize { self.runs.len() }

    pub fn is_empty(&self) -> bool { self.runs.is_empty() }
}

impl From<Vec<RunRecord>> for LayoutSnapshot {
    fn from(records: Vec<RunRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.add_run(record.entities, record.metadata);
        }
        snapshot
    }
}

impl From<LayoutSnapshot> for Vec<RunRecord> {
    fn from(snapshot: LayoutSnapshot) -> Self {
        snapshot
            .runs
            .into_iter()
            .map(|(entities, metadata)| RunRecord { entities, metadata })
            .collect()
    }
}

impl DatasetLayout for LayoutSnapshot {
    fn list_entities(&self, filter: &EntityFilter) -> Vec<EntityKey> {
        self.runs.keys().filter(|key| filter.matches(key)).cloned().collect()
    }

    fn get_metadata(&self, key: &EntityKey) -> Option<UnitMetadata> {
        self.runs.get(key).cloned().flatten()
    }
}
