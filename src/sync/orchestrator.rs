//! Sync orchestrator: drives fetch → merge → persist → push.
//!
//! One orchestrator exists per node. Cycles never overlap: a request that
//! arrives while a cycle is in flight is dropped. The merge runs inside one
//! write transaction against the freshest local data, so a local write can
//! never land between the read and the commit and be lost. Abandoning a
//! cycle before the commit leaves the local store untouched.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use super::error::SyncError;
use super::events::{ChangeNotifier, DataChanged};
use super::merge::{merge_dataset_with, ConflictPolicy, LastWriteWins};
use super::node::NodeConfig;
use super::remote::RemotePeer;
use super::status::{SyncOutcome, SyncReport, SyncState, SyncStatus};
use crate::config::SyncConfig;
use crate::db::EntityStore;
use crate::models::Snapshot;

pub struct SyncOrchestrator {
    store: Arc<dyn EntityStore>,
    peer: Arc<dyn RemotePeer>,
    policy: Arc<dyn ConflictPolicy>,
    config: SyncConfig,
    notifier: ChangeNotifier,
    status: RwLock<SyncStatus>,
    cycle: Mutex<()>,
    trigger: Notify,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        peer: Arc<dyn RemotePeer>,
        config: SyncConfig,
        notifier: ChangeNotifier,
    ) -> Self {
        let status = SyncStatus {
            role: config.role,
            ..SyncStatus::default()
        };
        Self {
            store,
            peer,
            policy: Arc::new(LastWriteWins),
            config,
            notifier,
            status: RwLock::new(status),
            cycle: Mutex::new(()),
            trigger: Notify::new(),
        }
    }

    /// Replaces the default last-write-wins conflict policy.
    pub fn with_policy(mut self, policy: Arc<dyn ConflictPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Asks the background loop to run a cycle as soon as possible.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    async fn node_config(&self) -> NodeConfig {
        NodeConfig::resolve(&self.config, &self.store.load_settings().await)
    }

    /// Runs one full sync cycle now.
    ///
    /// Returns `Skipped` when this node should not sync and `AlreadyRunning`
    /// when another cycle holds the lock. Errors are recorded in the status
    /// before being returned.
    pub async fn run_sync_cycle(&self) -> Result<SyncOutcome, SyncError> {
        let _guard = match self.cycle.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Sync cycle already running, dropping request");
                return Ok(SyncOutcome::AlreadyRunning);
            }
        };

        let node = self.node_config().await;
        let server_url = match node.target() {
            Ok(url) => url.to_string(),
            Err(reason) => {
                tracing::debug!("Skipping sync: {}", reason);
                let mut status = self.status.write().await;
                status.role = node.role;
                status.skipped = Some(reason);
                return Ok(SyncOutcome::Skipped(reason));
            }
        };

        {
            let mut status = self.status.write().await;
            status.role = node.role;
            status.skipped = None;
            status.state = SyncState::Syncing;
        }

        tracing::info!("Syncing with {}", server_url);
        let result = self.exchange(&server_url, node.timeout).await;

        let mut status = self.status.write().await;
        match result {
            Ok(report) => {
                tracing::info!(
                    changed = report.changed,
                    records = report.records,
                    tombstones = report.tombstones,
                    "Sync complete"
                );
                status.record_success(Utc::now());
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                tracing::warn!("Sync failed: {}", e);
                status.record_failure(Utc::now(), e.to_string());
                Err(e)
            }
        }
    }

    async fn exchange(&self, server_url: &str, timeout: Duration) -> Result<SyncReport, SyncError> {
        let remote = with_timeout(timeout, self.peer.fetch(server_url)).await?;

        let policy = self.policy.clone();
        let update = self
            .store
            .update_snapshot(&|local: &Snapshot| {
                merge_dataset_with(local, &remote, policy.as_ref())
            })
            .await?;
        let changed = update.changed();
        let merged = update.after;

        if changed {
            self.notifier.publish(DataChanged::SyncMerged);
        }

        with_timeout(timeout, self.peer.push(server_url, &merged.sanitized())).await?;

        Ok(SyncReport {
            changed,
            records: merged.record_count(),
            tombstones: merged.deletions.len(),
        })
    }

    /// Starts the background loop: one cycle right away, then one per
    /// interval or per [`trigger`](Self::trigger), until `shutdown` flips.
    ///
    /// A cycle in flight when shutdown arrives is abandoned and the status
    /// goes back to idle.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.run_sync_cycle() => {}
                    _ = shutdown.changed() => {
                        tracing::info!("Sync loop shutting down, abandoning cycle");
                        self.abandon_cycle().await;
                        break;
                    }
                }

                let interval = self.node_config().await.interval;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.trigger.notified() => {
                        tracing::debug!("Sync triggered");
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Sync loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}

impl SyncOrchestrator {
    async fn abandon_cycle(&self) {
        let mut status = self.status.write().await;
        if status.state == SyncState::Syncing {
            status.state = SyncState::Idle;
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, SyncError>>,
) -> Result<T, SyncError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SyncError::Network(format!("request timed out after {:?}", timeout)))?
}
