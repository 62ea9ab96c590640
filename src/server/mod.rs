//! Server-side modules for a daybook sync node.

pub mod routes;
pub mod service;

pub use routes::{router, AppState};
pub use service::{ServerError, SyncService};
