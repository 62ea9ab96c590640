//! Tombstones and the deletion log.
//!
//! A tombstone `(type, id, deletedAt)` is appended whenever a record is
//! removed on a node. Applying the log purges every live record with the same
//! `(type, id)` whose `updatedAt` is not strictly later than `deletedAt`; a
//! record edited after its deletion survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use super::timestamp;
use super::{Collection, Record};

/// A single tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deletion {
    #[serde(rename = "type")]
    pub entity_type: Collection,
    pub id: String,
    #[serde(with = "timestamp::required")]
    pub deleted_at: DateTime<Utc>,
}

impl Deletion {
    pub fn new(entity_type: Collection, id: impl Into<String>, deleted_at: DateTime<Utc>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            deleted_at,
        }
    }

    /// Whether this tombstone removes `record`.
    pub fn covers(&self, record: &Record) -> bool {
        record.id == self.id
            && match record.updated_at {
                Some(updated_at) => updated_at <= self.deleted_at,
                None => true,
            }
    }
}

/// Append-only log of tombstones, at most one per `(type, id)`.
///
/// Entries keep their insertion order; `index` maps each key to its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Deletion>", into = "Vec<Deletion>")]
pub struct DeletionLog {
    entries: Vec<Deletion>,
    index: HashMap<(Collection, String), usize>,
}

impl DeletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deletion> {
        self.entries.iter()
    }

    pub fn get(&self, entity_type: Collection, id: &str) -> Option<&Deletion> {
        self.index
            .get(&(entity_type, id.to_string()))
            .map(|&slot| &self.entries[slot])
    }

    /// Records a tombstone. A second tombstone for the same `(type, id)`
    /// keeps whichever `deletedAt` is later.
    pub fn record_deletion(&mut self, entity_type: Collection, id: &str, when: DateTime<Utc>) {
        self.insert(Deletion::new(entity_type, id, when));
    }

    fn insert(&mut self, deletion: Deletion) {
        match self.index.entry((deletion.entity_type, deletion.id.clone())) {
            Entry::Occupied(slot) => {
                let existing = &mut self.entries[*slot.get()];
                if deletion.deleted_at > existing.deleted_at {
                    existing.deleted_at = deletion.deleted_at;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.entries.len());
                self.entries.push(deletion);
            }
        }
    }

    /// Union of two logs by `(type, id)`, keeping the latest `deletedAt`.
    /// Entries of `self` come first, then new entries of `other` in order.
    pub fn union(&self, other: &DeletionLog) -> DeletionLog {
        let mut merged = self.clone();
        for deletion in &other.entries {
            merged.insert(deletion.clone());
        }
        merged
    }

    /// Removes every record covered by a tombstone from `collections`.
    ///
    /// The log itself is never modified. Returns the number of records
    /// removed.
    pub fn apply(&self, collections: &mut BTreeMap<Collection, Vec<Record>>) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        let index: HashMap<(Collection, &str), &Deletion> = self
            .entries
            .iter()
            .map(|d| ((d.entity_type, d.id.as_str()), d))
            .collect();

        let mut removed = 0;
        for (collection, records) in collections.iter_mut() {
            let before = records.len();
            records.retain(|record| match index.get(&(*collection, record.id.as_str())) {
                Some(deletion) => !deletion.covers(record),
                None => true,
            });
            removed += before - records.len();
        }
        removed
    }
}

impl FromIterator<Deletion> for DeletionLog {
    fn from_iter<I: IntoIterator<Item = Deletion>>(iter: I) -> Self {
        let mut log = DeletionLog::new();
        for deletion in iter {
            log.insert(deletion);
        }
        log
    }
}

impl From<Vec<Deletion>> for DeletionLog {
    fn from(entries: Vec<Deletion>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<DeletionLog> for Vec<Deletion> {
    fn from(log: DeletionLog) -> Self {
        log.entries
    }
}
