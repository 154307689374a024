//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Optional TLS listen configuration.
    pub tls: Option<TlsConfig>,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "tawk.straylight.net").
    pub name: String,
    /// Prometheus metrics port. 0 disables the HTTP endpoint (used by tests).
    pub metrics_port: Option<u16>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8000").
    pub address: SocketAddr,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Address to bind to for TLS (e.g., "0.0.0.0:8443").
    pub address: SocketAddr,
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: String,
}

/// File storage configuration for message attachments.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend: "fs" or "none".
    pub backend: String,
    /// Directory for the "fs" backend.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            path: "uploads".to_string(),
        }
    }
}

/// Per-connection rate limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Events allowed per second per connection.
    pub event_rate: f32,
    /// Burst capacity per connection.
    pub event_burst: f32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            event_rate: 10.0,
            event_burst: 20.0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
