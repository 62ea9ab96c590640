//! Server side of the snapshot exchange.
//!
//! A node answers pull and push requests only while its resolved role is
//! `server`. Pushes are merged into the node's own dataset inside one write
//! transaction, so neither a concurrent push nor a local write between the
//! read and the commit is lost.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::db::{EntityStore, StoreError};
use crate::models::Snapshot;
use crate::sync::{merge_dataset, ChangeNotifier, DataChanged, NodeConfig, Role};

/// Errors returned by the sync endpoints.
#[derive(Debug)]
pub enum ServerError {
    /// This node is not acting as a sync server.
    Forbidden,
    /// The pushed body could not be parsed or validated.
    Malformed(String),
    /// Persisting the merged snapshot failed.
    Storage(StoreError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Forbidden => write!(f, "Node is not configured as a sync server"),
            ServerError::Malformed(e) => write!(f, "Malformed snapshot: {}", e),
            ServerError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Storage(e)
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ServerError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ServerError::Malformed(_) => (StatusCode::BAD_REQUEST, "malformed_snapshot"),
            ServerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        (
            status,
            Json(ErrorBody {
                error,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Handles pull and push requests against the local store.
pub struct SyncService {
    store: Arc<dyn EntityStore>,
    config: SyncConfig,
    notifier: ChangeNotifier,
}

impl SyncService {
    pub fn new(store: Arc<dyn EntityStore>, config: SyncConfig, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            config,
            notifier,
        }
    }

    /// Fails with `Forbidden` unless the node currently resolves to the
    /// server role.
    pub async fn ensure_server(&self) -> Result<(), ServerError> {
        let settings = self.store.load_settings().await;
        match NodeConfig::resolve(&self.config, &settings).role {
            Role::Server => Ok(()),
            Role::Client => Err(ServerError::Forbidden),
        }
    }

    /// The node's dataset with node-local settings removed.
    pub async fn pull(&self) -> Result<Snapshot, ServerError> {
        self.ensure_server().await?;
        let snapshot = self.store.load_snapshot().await;
        tracing::debug!(records = snapshot.record_count(), "Serving snapshot");
        Ok(snapshot.sanitized())
    }

    /// Merges a pushed snapshot body into the node's dataset.
    ///
    /// Returns whether the stored dataset changed.
    pub async fn push(&self, body: &[u8]) -> Result<bool, ServerError> {
        self.ensure_server().await?;

        let incoming: Snapshot =
            serde_json::from_slice(body).map_err(|e| ServerError::Malformed(e.to_string()))?;
        incoming
            .validate()
            .map_err(|e| ServerError::Malformed(e.to_string()))?;

        let update = self
            .store
            .update_snapshot(&|local: &Snapshot| merge_dataset(local, &incoming))
            .await?;
        if !update.changed() {
            tracing::debug!("Pushed snapshot brought no changes");
            return Ok(false);
        }

        let merged = update.after;
        tracing::info!(
            records = merged.record_count(),
            tombstones = merged.deletions.len(),
            "Merged pushed snapshot"
        );
        self.notifier.publish(DataChanged::PeerPushed);
        Ok(true)
    }
}
