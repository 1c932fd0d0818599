//! Configuration management for the sync client.

use std::env;
use std::time::Duration;

use roomsync_engine::CollectionPaths;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the document server, e.g. `http://localhost:3000`
    pub server_url: Option<String>,
    /// Identifier stamped on every write
    pub device_id: String,
    /// Human-readable device name for sync metadata
    pub device_name: String,
    /// Root and per-user collection paths
    pub paths: CollectionPaths,
    /// Collection receiving per-device sync metadata
    pub metadata_collection: String,
    /// How long an unconfirmed local write may shadow remote data
    pub pending_ttl: Duration,
    /// Bearer token sent to the server
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: "unknown-device".to_string(),
            paths: CollectionPaths::default(),
            metadata_collection: "sync_metadata".to_string(),
            pending_ttl: Duration::from_secs(30),
            token: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pending_ttl = match env::var("ROOMSYNC_PENDING_TTL_SECS") {
            Ok(value) => Duration::from_secs(
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidPendingTtl(value))?,
            ),
            Err(_) => defaults.pending_ttl,
        };

        let paths = CollectionPaths::new(
            env::var("ROOMSYNC_ROOT_COLLECTION").unwrap_or(defaults.paths.root),
            env::var("ROOMSYNC_USER_COLLECTION").unwrap_or(defaults.paths.user_template),
        );
        if !paths.user_template.contains("{uid}") {
            return Err(ConfigError::InvalidUserCollection(paths.user_template));
        }

        Ok(Self {
            server_url: env::var("ROOMSYNC_SERVER_URL").ok(),
            device_id: env::var("ROOMSYNC_DEVICE_ID").unwrap_or(defaults.device_id),
            device_name: env::var("ROOMSYNC_DEVICE_NAME").unwrap_or(defaults.device_name),
            paths,
            metadata_collection: env::var("ROOMSYNC_METADATA_COLLECTION")
                .unwrap_or(defaults.metadata_collection),
            pending_ttl,
            token: env::var("ROOMSYNC_TOKEN").ok(),
        })
    }

    /// The server URL, required by the WebSocket backend.
    pub fn require_server_url(&self) -> Result<&str, ConfigError> {
        self.server_url
            .as_deref()
            .ok_or(ConfigError::MissingServerUrl)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ROOMSYNC_SERVER_URL environment variable is required")]
    MissingServerUrl,

    #[error("Invalid ROOMSYNC_PENDING_TTL_SECS value: {0}")]
    InvalidPendingTtl(String),

    #[error("ROOMSYNC_USER_COLLECTION must contain {{uid}}: {0}")]
    InvalidUserCollection(String),
}
