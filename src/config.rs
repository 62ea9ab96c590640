use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::sync::Role;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether this node syncs as a client or serves as the sync server
    #[serde(default)]
    pub role: Role,
    /// Sync server base URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// Run sync cycles at all (default: false)
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between background sync cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Timeout for each network request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Run a sync cycle after CLI writes (default: false)
    #[serde(default)]
    pub auto_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            server_url: None,
            enabled: false,
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            auto_sync: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body, in bytes. A pushed snapshot carries the
    /// whole dataset, so this sits well above axum's 2 MiB default.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
    /// Server configuration
    pub server: ServerConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    sync: Option<SyncConfig>,
    server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("daybook.db"),
            ConfigSource::Default,
        );
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut server = ServerConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
            if let Some(server_config) = file_config.server {
                server = server_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("DAYBOOK_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("DAYBOOK_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(role) = std::env::var("DAYBOOK_SYNC_ROLE") {
            sync.role =
                Role::from_str(&role).map_err(|e| ConfigError::InvalidEnv("DAYBOOK_SYNC_ROLE", e))?;
        }
        if let Ok(enabled) = std::env::var("DAYBOOK_SYNC_ENABLED") {
            sync.enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(port) = std::env::var("DAYBOOK_PORT") {
            server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("DAYBOOK_PORT", port.clone()))?;
        }
        if let Ok(limit) = std::env::var("DAYBOOK_MAX_BODY_BYTES") {
            server.max_body_bytes = limit
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("DAYBOOK_MAX_BODY_BYTES", limit.clone()))?;
        }

        Ok(Self {
            database_path,
            config_file,
            sync,
            server,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/daybook/
    /// - macOS: ~/Library/Application Support/daybook/
    /// - Windows: %APPDATA%/daybook/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/daybook/
    /// - macOS: ~/Library/Application Support/daybook/
    /// - Windows: %APPDATA%/daybook/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(var, value) => {
                write!(f, "Invalid value for {}: {}", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidEnv(..) => None,
        }
    }
}
