//! Node role and effective sync configuration.
//!
//! The base values come from the config file. Node-local settings keys
//! (`syncRole`, `syncServerUrl`, `syncEnabled`, `syncInterval`) override them
//! at the start of every cycle, so a settings change takes effect on the next
//! tick without a restart.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::models::Settings;

/// What a node does during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pulls from and pushes to a remote server.
    #[default]
    Client,
    /// Serves pull/push requests; never initiates sync.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            _ => Err(format!(
                "Invalid sync role '{}'. Valid options: client, server",
                s
            )),
        }
    }
}

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Disabled,
    ServerRole,
    NoServerUrl,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "sync is disabled"),
            SkipReason::ServerRole => write!(f, "node is configured as a server"),
            SkipReason::NoServerUrl => write!(f, "no sync server URL configured"),
        }
    }
}

/// Effective sync configuration for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub role: Role,
    pub server_url: Option<String>,
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

impl NodeConfig {
    /// Overlays node-local settings on top of the configured defaults.
    /// Settings values of the wrong type are ignored with a warning.
    pub fn resolve(base: &SyncConfig, settings: &Settings) -> Self {
        let mut node = NodeConfig {
            role: base.role,
            server_url: base.server_url.clone(),
            enabled: base.enabled,
            interval: Duration::from_secs(base.interval_secs),
            timeout: Duration::from_secs(base.timeout_secs),
        };

        if let Some(value) = settings.get("syncRole") {
            match value.as_str().map(Role::from_str) {
                Some(Ok(role)) => node.role = role,
                _ => tracing::warn!("Ignoring invalid syncRole setting: {}", value),
            }
        }

        if let Some(value) = settings.get("syncServerUrl") {
            match value {
                Value::String(url) if url.trim().is_empty() => node.server_url = None,
                Value::String(url) => node.server_url = Some(url.trim().to_string()),
                Value::Null => node.server_url = None,
                other => tracing::warn!("Ignoring invalid syncServerUrl setting: {}", other),
            }
        }

        if let Some(value) = settings.get("syncEnabled") {
            match parse_bool(value) {
                Some(enabled) => node.enabled = enabled,
                None => tracing::warn!("Ignoring invalid syncEnabled setting: {}", value),
            }
        }

        if let Some(value) = settings.get("syncInterval") {
            match parse_secs(value) {
                Some(secs) if secs > 0 => node.interval = Duration::from_secs(secs),
                _ => tracing::warn!("Ignoring invalid syncInterval setting: {}", value),
            }
        }

        node
    }

    /// The server URL to sync against, or the reason this node should not
    /// initiate a cycle.
    pub fn target(&self) -> Result<&str, SkipReason> {
        if !self.enabled {
            return Err(SkipReason::Disabled);
        }
        if self.role == Role::Server {
            return Err(SkipReason::ServerRole);
        }
        self.server_url.as_deref().ok_or(SkipReason::NoServerUrl)
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_secs(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
