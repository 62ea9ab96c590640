//! HTTP access to a remote sync server.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use super::error::SyncError;
use crate::models::Snapshot;

/// Path of the snapshot exchange endpoint on a sync server.
pub const SYNC_PATH: &str = "/api/sync";

/// A remote node that can serve and accept snapshots.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    /// Pulls the peer's snapshot.
    async fn fetch(&self, server_url: &str) -> Result<Snapshot, SyncError>;

    /// Pushes a snapshot for the peer to merge into its own.
    async fn push(&self, server_url: &str, snapshot: &Snapshot) -> Result<(), SyncError>;
}

/// [`RemotePeer`] over HTTP + JSON.
#[derive(Debug, Clone)]
pub struct HttpPeer {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeer {
    /// Creates a peer client. Every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the snapshot endpoint URL from a server base URL.
    ///
    /// A bare host gets `http://`; a trailing slash is dropped.
    pub fn build_sync_url(server_url: &str) -> String {
        let base = server_url.trim().trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}{}", base, SYNC_PATH)
        } else {
            format!("http://{}{}", base, SYNC_PATH)
        }
    }

    fn check_status(status: StatusCode) -> Result<(), SyncError> {
        if status == StatusCode::FORBIDDEN {
            return Err(SyncError::Forbidden);
        }
        if !status.is_success() {
            return Err(SyncError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemotePeer for HttpPeer {
    async fn fetch(&self, server_url: &str) -> Result<Snapshot, SyncError> {
        let url = Self::build_sync_url(server_url);
        tracing::debug!("Fetching snapshot from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Self::check_status(response.status())?;

        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        let snapshot: Snapshot = serde_json::from_slice(&body)
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;
        snapshot
            .validate()
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;

        Ok(snapshot)
    }

    async fn push(&self, server_url: &str, snapshot: &Snapshot) -> Result<(), SyncError> {
        let url = Self::build_sync_url(server_url);
        tracing::debug!("Pushing snapshot to {}", url);

        let response = self
            .client
            .post(&url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Self::check_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sync_url_with_http() {
        assert_eq!(
            HttpPeer::build_sync_url("http://localhost:8080"),
            "http://localhost:8080/api/sync"
        );
    }

    #[test]
    fn test_build_sync_url_with_https_and_trailing_slash() {
        assert_eq!(
            HttpPeer::build_sync_url("https://sync.example.com/"),
            "https://sync.example.com/api/sync"
        );
    }

    #[test]
    fn test_build_sync_url_bare_host() {
        assert_eq!(
            HttpPeer::build_sync_url("localhost:8080"),
            "http://localhost:8080/api/sync"
        );
    }

    #[test]
    fn test_check_status() {
        assert!(HttpPeer::check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            HttpPeer::check_status(StatusCode::FORBIDDEN),
            Err(SyncError::Forbidden)
        ));
        assert!(matches!(
            HttpPeer::check_status(StatusCode::BAD_GATEWAY),
            Err(SyncError::HttpStatus(502))
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_error() {
        let peer = HttpPeer::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let result = peer.fetch("http://127.0.0.1:9").await;
        assert!(matches!(result, Err(SyncError::Network(_))));
    }
}
