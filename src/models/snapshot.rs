//! Full dataset snapshot: every collection plus settings and deletions.
//!
//! This is the unit exchanged between nodes during a sync cycle. On the wire
//! each collection is a top-level array keyed by its name:
//!
//! ```json
//! {
//!   "tasks": [{"id": "t1", "title": "A", "updatedAt": "2024-01-01T00:00:00.000Z"}],
//!   "notes": [],
//!   "settings": {"theme": "dark"},
//!   "deletions": [{"type": "tasks", "id": "t0", "deletedAt": "2023-12-31T00:00:00.000Z"}]
//! }
//! ```
//!
//! Missing collections read as empty; unknown top-level keys are rejected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{Collection, DeletionLog, Record, Settings};

/// Errors found when validating a snapshot received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// A top-level key that is not a known collection.
    UnknownCollection(String),
    /// The same id appears twice within one collection.
    DuplicateId { collection: Collection, id: String },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::UnknownCollection(name) => {
                write!(f, "Unknown collection '{}'", name)
            }
            SnapshotError::DuplicateId { collection, id } => {
                write!(f, "Duplicate id '{}' in collection '{}'", id, collection)
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    collections: BTreeMap<Collection, Vec<Record>>,
    pub settings: Settings,
    pub deletions: DeletionLog,
}

/// Serialized shape of a snapshot.
#[derive(Serialize, Deserialize)]
struct WireSnapshot {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    deletions: DeletionLog,
    #[serde(flatten)]
    collections: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            collections: Collection::ALL
                .into_iter()
                .map(|c| (c, Vec::new()))
                .collect(),
            settings: Settings::new(),
            deletions: DeletionLog::new(),
        }
    }

    pub fn records(&self, collection: Collection) -> &[Record] {
        self.collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn records_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        self.collections.entry(collection).or_default()
    }

    pub fn set_records(&mut self, collection: Collection, records: Vec<Record>) {
        self.collections.insert(collection, records);
    }

    pub fn with_records(mut self, collection: Collection, records: Vec<Record>) -> Self {
        self.set_records(collection, records);
        self
    }

    pub fn collections(&self) -> impl Iterator<Item = (Collection, &[Record])> {
        self.collections.iter().map(|(c, r)| (*c, r.as_slice()))
    }

    /// Total number of live records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Purges every record covered by this snapshot's own deletion log.
    pub fn apply_deletions(&mut self) -> usize {
        let Snapshot {
            collections,
            deletions,
            ..
        } = self;
        deletions.apply(collections)
    }

    /// A copy safe to send to a peer: node-local settings removed.
    pub fn sanitized(&self) -> Snapshot {
        Snapshot {
            collections: self.collections.clone(),
            settings: self.settings.without_node_local(),
            deletions: self.deletions.clone(),
        }
    }

    /// Rejects snapshots with duplicate ids inside a collection.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for (collection, records) in &self.collections {
            let mut seen = HashSet::with_capacity(records.len());
            for record in records {
                if !seen.insert(record.id.as_str()) {
                    return Err(SnapshotError::DuplicateId {
                        collection: *collection,
                        id: record.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<WireSnapshot> for Snapshot {
    type Error = SnapshotError;

    fn try_from(wire: WireSnapshot) -> Result<Self, Self::Error> {
        let mut snapshot = Snapshot::new();
        for (name, records) in wire.collections {
            let collection = Collection::ALL
                .into_iter()
                .find(|c| c.name() == name)
                .ok_or(SnapshotError::UnknownCollection(name))?;
            snapshot.set_records(collection, records);
        }
        snapshot.settings = wire.settings;
        snapshot.deletions = wire.deletions;
        Ok(snapshot)
    }
}

impl From<Snapshot> for WireSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        WireSnapshot {
            settings: snapshot.settings,
            deletions: snapshot.deletions,
            collections: snapshot
                .collections
                .into_iter()
                .map(|(c, records)| (c.name().to_string(), records))
                .collect(),
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireSnapshot::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireSnapshot::deserialize(deserializer)?;
        Snapshot::try_from(wire).map_err(serde::de::Error::custom)
    }
}
