use chrono::{DateTime, Utc};
use serde::Serialize;

use super::node::{Role, SkipReason};
use crate::models::timestamp;

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Error => write!(f, "error"),
        }
    }
}

/// Outcome of the most recent completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    #[serde(with = "timestamp::required")]
    pub at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Queryable sync status of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(with = "timestamp::optional")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::optional")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<CycleRecord>,
}

impl SyncStatus {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.state = SyncState::Idle;
        self.last_success_at = Some(at);
        self.last_result = Some(CycleRecord {
            at,
            success: true,
            error_message: None,
        });
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>, message: String) {
        self.state = SyncState::Error;
        self.last_failure_at = Some(at);
        self.last_result = Some(CycleRecord {
            at,
            success: false,
            error_message: Some(message),
        });
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the merged snapshot differs from what was stored locally.
    pub changed: bool,
    /// Live records after the merge.
    pub records: usize,
    /// Tombstones after the merge.
    pub tombstones: usize,
}

/// What a call to run a cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
    /// Another cycle was already in flight; this request was dropped.
    AlreadyRunning,
}
