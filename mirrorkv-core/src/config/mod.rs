//! Configuration management for mirrorkv
//!
//! Typed configuration with defaults, environment overrides, and
//! validation. Environment variables follow the pattern
//! `MIRRORKV_<SECTION>_<KEY>`.

use crate::core_net::PushPolicy;
use crate::core_sync::{SyncConfig, SyncMode};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Listener configuration
    pub server: ServerConfig,

    /// The other node of the pair
    pub peer: PeerConfig,

    /// Anti-entropy reconciliation
    pub sync: SyncConfig,

    /// Eager push retry policy
    pub replication: ReplicationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the dispatcher binds
    pub listen_addr: SocketAddr,
}

/// Address of the peer node. Fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub host: String,
    pub port: u16,
}

/// Outbound push retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Hard cap on connect+write attempts per push
    pub max_retries: u32,

    /// Delay before the first attempt; doubles per retry
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Cap on concurrently in-flight push tasks
    pub max_inflight: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            peer: PeerConfig::default(),
            sync: SyncConfig::default(),
            replication: ReplicationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5008".parse().expect("valid literal address"),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5009,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_inflight: 32,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl From<&ReplicationConfig> for PushPolicy {
    fn from(config: &ReplicationConfig) -> Self {
        PushPolicy {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_inflight: config.max_inflight,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables on top of the
    /// defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("MIRRORKV_SERVER_LISTEN_ADDR") {
            config.server.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid listen address: {}", e)))?;
        }
        if let Ok(host) = env::var("MIRRORKV_PEER_HOST") {
            config.peer.host = host;
        }
        if let Ok(port) = env::var("MIRRORKV_PEER_PORT") {
            config.peer.port = port
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid peer port: {}", e)))?;
        }
        if let Ok(interval) = env::var("MIRRORKV_SYNC_INTERVAL_MS") {
            config.sync.interval = parse_millis(&interval, "sync interval")?;
        }
        if let Ok(timeout) = env::var("MIRRORKV_SYNC_PULL_TIMEOUT_MS") {
            config.sync.pull_timeout = parse_millis(&timeout, "pull timeout")?;
        }
        if let Ok(mode) = env::var("MIRRORKV_SYNC_MODE") {
            config.sync.mode = mode.parse::<SyncMode>().map_err(ConfigError::InvalidValue)?;
        }
        if let Ok(retries) = env::var("MIRRORKV_REPLICATION_MAX_RETRIES") {
            config.replication.max_retries = retries
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid max retries: {}", e)))?;
        }
        if let Ok(backoff) = env::var("MIRRORKV_REPLICATION_INITIAL_BACKOFF_MS") {
            config.replication.initial_backoff = parse_millis(&backoff, "initial backoff")?;
        }
        if let Ok(level) = env::var("MIRRORKV_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("MIRRORKV_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer.host.is_empty() {
            return Err(ConfigError::ValidationFailed("peer host is empty".into()));
        }
        if self.peer.port == 0 {
            return Err(ConfigError::ValidationFailed("peer port is zero".into()));
        }
        if self.peer.host == self.server.listen_addr.ip().to_string()
            && self.peer.port == self.server.listen_addr.port()
        {
            return Err(ConfigError::ValidationFailed(
                "node is configured as its own peer".into(),
            ));
        }
        if self.sync.interval.is_zero() {
            return Err(ConfigError::ValidationFailed("sync interval is zero".into()));
        }
        if self.replication.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "replication needs at least one attempt".into(),
            ));
        }
        if self.replication.max_inflight == 0 {
            return Err(ConfigError::ValidationFailed(
                "replication needs a non-zero in-flight cap".into(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(value: &str, what: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}
