//! Daybook: an offline-first sync and merge core for a personal productivity
//! app.
//!
//! Every node (a desktop client or a hosted server) keeps a full copy of the
//! dataset in SQLite and converges with its peers through snapshot exchange,
//! per-record last-write-wins and a tombstone log.

pub mod config;
pub mod db;
pub mod models;
pub mod server;
pub mod sync;
