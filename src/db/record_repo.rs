use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use super::store::{EntityStore, StoreError};
use crate::models::{Collection, Record, Settings, Snapshot};
use crate::sync::{ChangeNotifier, DataChanged};

/// Local CRUD over the entity store.
///
/// This is the write path the interactive layer uses. It stamps timestamps,
/// records tombstones on delete and publishes a change event after every
/// successful write. It never waits on sync.
pub struct RecordRepository {
    store: Arc<dyn EntityStore>,
    notifier: ChangeNotifier,
}

impl RecordRepository {
    pub fn new(store: Arc<dyn EntityStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn list(&self, collection: Collection) -> Vec<Record> {
        self.store.load(collection).await
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Option<Record> {
        self.store
            .load(collection)
            .await
            .into_iter()
            .find(|r| r.id == id)
    }

    /// Inserts or replaces a record.
    ///
    /// `updatedAt` is set to now. An existing record keeps its position and
    /// its `createdAt`; a new one is appended.
    pub async fn upsert(&self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let now = Utc::now();
        let update = self
            .store
            .update_snapshot(&|current: &Snapshot| {
                let mut next = current.clone();
                let mut record = record.clone();
                let records = next.records_mut(collection);
                match records.iter_mut().find(|r| r.id == record.id) {
                    Some(existing) => {
                        record.created_at = existing.created_at.or(record.created_at);
                        record.touch(now);
                        *existing = record;
                    }
                    None => {
                        record.touch(now);
                        records.push(record);
                    }
                }
                next
            })
            .await?;

        self.notifier.publish(DataChanged::Records(collection));
        let saved = update
            .after
            .records(collection)
            .iter()
            .find(|r| r.id == record.id)
            .cloned()
            .unwrap_or(record);
        Ok(saved)
    }

    /// Removes a record and records its tombstone, in one transaction.
    ///
    /// Returns false if no such record existed; the tombstone is recorded
    /// either way.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let update = self
            .store
            .update_snapshot(&|current: &Snapshot| {
                let mut next = current.clone();
                next.deletions.record_deletion(collection, id, now);
                next.records_mut(collection).retain(|r| r.id != id);
                next
            })
            .await?;

        self.notifier.publish(DataChanged::Records(collection));
        Ok(update.before.records(collection).iter().any(|r| r.id == id))
    }

    pub async fn settings(&self) -> Settings {
        self.store.load_settings().await
    }

    /// Sets one settings key. Shared keys stamp the document's `updatedAt`
    /// so the change wins the next settings merge; node-local keys do not.
    pub async fn set_setting(&self, key: &str, value: Value) -> Result<Settings, StoreError> {
        let now = Utc::now();
        let update = self
            .store
            .update_snapshot(&|current: &Snapshot| {
                let mut next = current.clone();
                if Settings::is_node_local(key) {
                    next.settings.insert(key, value.clone());
                } else {
                    next.settings.set(key, value.clone(), now);
                }
                next
            })
            .await?;

        self.notifier.publish(DataChanged::Settings);
        Ok(update.after.settings)
    }

    /// Removes one settings key. Returns false if it was not set.
    ///
    /// A shared key is cleared to `null` rather than dropped: the marker
    /// travels with the newer settings document, so the removal wins the
    /// next merge instead of the peer's older value coming back. Node-local
    /// keys are simply dropped.
    pub async fn remove_setting(&self, key: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let update = self
            .store
            .update_snapshot(&|current: &Snapshot| {
                let mut next = current.clone();
                if !next.settings.is_set(key) {
                    return next;
                }
                if Settings::is_node_local(key) {
                    next.settings.remove(key);
                } else {
                    next.settings.set(key, Value::Null, now);
                }
                next
            })
            .await?;

        let removed = update.changed();
        if removed {
            self.notifier.publish(DataChanged::Settings);
        }
        Ok(removed)
    }
}
