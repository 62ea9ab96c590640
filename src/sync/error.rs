//! Sync error types.

use crate::db::StoreError;

/// Errors that can occur during a sync cycle.
#[derive(Debug)]
pub enum SyncError {
    /// Failed to reach the server or the request timed out
    Network(String),
    /// Server answered with an unexpected status
    HttpStatus(u16),
    /// Server refused the request because it is not acting as a sync server
    Forbidden,
    /// Peer sent a payload that could not be parsed or validated
    MalformedPayload(String),
    /// Local storage write failed
    Store(StoreError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Network(e) => write!(f, "Network error: {}", e),
            SyncError::HttpStatus(status) => write!(f, "Server returned status {}", status),
            SyncError::Forbidden => write!(
                f,
                "Server refused sync. Is the remote node configured with role 'server'?"
            ),
            SyncError::MalformedPayload(e) => write!(f, "Malformed snapshot from server: {}", e),
            SyncError::Store(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}
