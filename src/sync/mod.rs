//! Offline-first synchronization.
//!
//! Every node keeps a full local dataset and reconciles it with a peer using
//! whole-record last-write-wins plus a tombstone log. There is no central
//! transaction log and no cross-node locking: nodes converge because the
//! merge is deterministic and deletions are monotonic.
//!
//! # Cycle
//!
//! A client node periodically (or on demand):
//! 1. fetches the server's snapshot,
//! 2. merges it with its own ([`merge_dataset`]),
//! 3. persists the merged snapshot atomically,
//! 4. pushes the merged snapshot (without node-local settings) back.
//!
//! A server node never initiates a cycle; it answers pull and push requests
//! (see `crate::server`).

mod error;
mod events;
mod merge;
mod node;
mod orchestrator;
mod remote;
mod status;

pub use error::SyncError;
pub use events::{ChangeNotifier, DataChanged};
pub use merge::{
    merge_dataset, merge_dataset_with, merge_lists, merge_settings, ConflictPolicy, LastWriteWins,
    Winner,
};
pub use node::{NodeConfig, Role, SkipReason};
pub use orchestrator::SyncOrchestrator;
pub use remote::{HttpPeer, RemotePeer, SYNC_PATH};
pub use status::{CycleRecord, SyncOutcome, SyncReport, SyncState, SyncStatus};
