//! Entity store: durable load/save of collections, tombstones and settings.
//!
//! Every save is replace-all inside a single SQLite transaction, so a
//! concurrent reader sees either the old or the new contents of a collection,
//! never a mix. Read-modify-write goes through
//! [`EntityStore::update_snapshot`], which holds the write lock from the read
//! to the commit. Loads never fail: storage errors and corrupt rows are logged
//! and read as "no data yet".

use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::models::{timestamp, Collection, Deletion, DeletionLog, Record, Settings, Snapshot};

/// Errors that can occur while writing to the store.
#[derive(Debug)]
pub enum StoreError {
    /// Database error
    Database(sqlx::Error),
    /// A record or setting could not be serialized
    Serialize(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Serialize(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Serialize(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e)
    }
}

/// Durable storage for one node's dataset.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Loads a collection in stored order. Returns an empty list on failure.
    async fn load(&self, collection: Collection) -> Vec<Record>;

    /// Replaces the whole collection.
    async fn save(&self, collection: Collection, records: &[Record]) -> Result<(), StoreError>;

    async fn load_deletions(&self) -> DeletionLog;

    /// Replaces the whole deletion log.
    async fn save_deletions(&self, log: &DeletionLog) -> Result<(), StoreError>;

    async fn load_settings(&self) -> Settings;

    /// Replaces the whole settings document.
    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Loads every collection, the deletion log and settings from one
    /// consistent read.
    async fn load_snapshot(&self) -> Snapshot;

    /// Replaces everything in one atomic unit.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Reads the dataset, applies `update` and writes back what changed, as
    /// one transaction that excludes every other writer.
    ///
    /// Unlike the loads, a failed read here is an error: writing back a
    /// dataset that was never read would erase it.
    async fn update_snapshot(
        &self,
        update: &(dyn for<'s> Fn(&'s Snapshot) -> Snapshot + Send + Sync),
    ) -> Result<SnapshotUpdate, StoreError>;
}

/// The dataset before and after an [`EntityStore::update_snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub before: Snapshot,
    pub after: Snapshot,
}

impl SnapshotUpdate {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    data: String,
}

#[derive(sqlx::FromRow)]
struct DeletionRow {
    entity_type: String,
    id: String,
    deleted_at: String,
}

#[derive(sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

/// SQLite-backed entity store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Starts a transaction that already owns SQLite's write lock.
///
/// A plain `BEGIN` only takes the lock at the first write, so two
/// read-modify-write transactions could both read before either writes.
async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE write_lock SET generation = generation + 1 WHERE id = 0")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

async fn read_records(
    conn: &mut SqliteConnection,
    collection: Collection,
) -> Result<Vec<Record>, sqlx::Error> {
    let rows: Vec<RecordRow> =
        sqlx::query_as("SELECT id, data FROM records WHERE collection = ? ORDER BY position")
            .bind(collection.name())
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match serde_json::from_str::<Record>(&row.data) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(%collection, id = %row.id, "Skipping corrupt record: {}", e);
                None
            }
        })
        .collect())
}

async fn write_records(
    conn: &mut SqliteConnection,
    collection: Collection,
    records: &[Record],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM records WHERE collection = ?")
        .bind(collection.name())
        .execute(&mut *conn)
        .await?;

    for (position, record) in records.iter().enumerate() {
        let data = serde_json::to_string(record)?;
        // A duplicate id replaces the earlier row, so the last one wins.
        sqlx::query(
            "INSERT OR REPLACE INTO records (collection, id, position, data) VALUES (?, ?, ?, ?)",
        )
        .bind(collection.name())
        .bind(&record.id)
        .bind(position as i64)
        .bind(&data)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn read_deletions(conn: &mut SqliteConnection) -> Result<DeletionLog, sqlx::Error> {
    let rows: Vec<DeletionRow> =
        sqlx::query_as("SELECT entity_type, id, deleted_at FROM deletions ORDER BY position")
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let entity_type = Collection::parse(&row.entity_type);
            let deleted_at = timestamp::parse_str(&row.deleted_at);
            match (entity_type, deleted_at) {
                (Some(entity_type), Some(deleted_at)) => {
                    Some(Deletion::new(entity_type, row.id, deleted_at))
                }
                _ => {
                    tracing::warn!(
                        entity_type = %row.entity_type,
                        id = %row.id,
                        "Skipping corrupt tombstone"
                    );
                    None
                }
            }
        })
        .collect())
}

async fn write_deletions(conn: &mut SqliteConnection, log: &DeletionLog) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM deletions").execute(&mut *conn).await?;

    for (position, deletion) in log.iter().enumerate() {
        sqlx::query(
            "INSERT OR REPLACE INTO deletions (entity_type, id, deleted_at, position) VALUES (?, ?, ?, ?)",
        )
        .bind(deletion.entity_type.name())
        .bind(&deletion.id)
        .bind(timestamp::format(&deletion.deleted_at))
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn read_settings(conn: &mut SqliteConnection) -> Result<Settings, sqlx::Error> {
    let rows: Vec<SettingRow> = sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match serde_json::from_str(&row.value) {
            Ok(value) => Some((row.key, value)),
            Err(e) => {
                tracing::warn!(key = %row.key, "Skipping corrupt setting: {}", e);
                None
            }
        })
        .collect())
}

async fn write_settings(conn: &mut SqliteConnection, settings: &Settings) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM settings").execute(&mut *conn).await?;

    for (key, value) in settings.iter() {
        sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn read_snapshot(conn: &mut SqliteConnection) -> Result<Snapshot, sqlx::Error> {
    let mut snapshot = Snapshot::new();
    for collection in Collection::ALL {
        snapshot.set_records(collection, read_records(&mut *conn, collection).await?);
    }
    snapshot.deletions = read_deletions(&mut *conn).await?;
    snapshot.settings = read_settings(&mut *conn).await?;
    Ok(snapshot)
}

impl SqliteStore {
    async fn try_load(&self, collection: Collection) -> Result<Vec<Record>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        read_records(&mut conn, collection).await
    }

    async fn try_load_deletions(&self) -> Result<DeletionLog, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        read_deletions(&mut conn).await
    }

    async fn try_load_settings(&self) -> Result<Settings, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        read_settings(&mut conn).await
    }

    async fn try_load_snapshot(&self) -> Result<Snapshot, sqlx::Error> {
        // A read transaction keeps all collections from the same commit.
        let mut tx = self.pool.begin().await?;
        let snapshot = read_snapshot(&mut tx).await?;
        tx.commit().await?;
        Ok(snapshot)
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn load(&self, collection: Collection) -> Vec<Record> {
        self.try_load(collection).await.unwrap_or_else(|e| {
            tracing::warn!(%collection, "Failed to load collection, treating as empty: {}", e);
            Vec::new()
        })
    }

    async fn save(&self, collection: Collection, records: &[Record]) -> Result<(), StoreError> {
        let mut tx = begin_write(&self.pool).await?;
        write_records(&mut tx, collection, records).await?;
        tx.commit().await?;
        tracing::debug!(%collection, count = records.len(), "Saved collection");
        Ok(())
    }

    async fn load_deletions(&self) -> DeletionLog {
        self.try_load_deletions().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load deletions, treating as empty: {}", e);
            DeletionLog::new()
        })
    }

    async fn save_deletions(&self, log: &DeletionLog) -> Result<(), StoreError> {
        let mut tx = begin_write(&self.pool).await?;
        write_deletions(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_settings(&self) -> Settings {
        self.try_load_settings().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, treating as empty: {}", e);
            Settings::new()
        })
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let mut tx = begin_write(&self.pool).await?;
        write_settings(&mut tx, settings).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Snapshot {
        self.try_load_snapshot().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load snapshot, treating as empty: {}", e);
            Snapshot::new()
        })
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut tx = begin_write(&self.pool).await?;
        for (collection, records) in snapshot.collections() {
            write_records(&mut tx, collection, records).await?;
        }
        write_deletions(&mut tx, &snapshot.deletions).await?;
        write_settings(&mut tx, &snapshot.settings).await?;
        tx.commit().await?;

        tracing::debug!(
            records = snapshot.record_count(),
            tombstones = snapshot.deletions.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    async fn update_snapshot(
        &self,
        update: &(dyn for<'s> Fn(&'s Snapshot) -> Snapshot + Send + Sync),
    ) -> Result<SnapshotUpdate, StoreError> {
        let mut tx = begin_write(&self.pool).await?;
        let before = read_snapshot(&mut tx).await?;
        let after = update(&before);

        // Only the parts that changed are rewritten.
        for (collection, records) in after.collections() {
            if before.records(collection) != records {
                write_records(&mut tx, collection, records).await?;
            }
        }
        if before.deletions != after.deletions {
            write_deletions(&mut tx, &after.deletions).await?;
        }
        if before.settings != after.settings {
            write_settings(&mut tx, &after.settings).await?;
        }
        tx.commit().await?;

        Ok(SnapshotUpdate { before, after })
    }
}
