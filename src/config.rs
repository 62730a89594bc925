use std::env;
use std::path::PathBuf;

use crate::runtime::handle::RuntimeConfig;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3040)
    pub port: u16,
    /// SQLite database file (default: ./classsync.db)
    pub database_path: PathBuf,
    /// Directory holding materialized assets (default: ./assets)
    pub asset_root: PathBuf,
    /// Public URL prefix of `asset_root` (default: http://localhost:3040/assets)
    pub public_asset_base_url: String,
    /// Upper bound on one synchronization in milliseconds (default: 30000)
    pub sync_timeout_ms: u64,
    /// Pending sync commands before callers wait (default: 64)
    pub command_queue_bound: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port = var("PORT", "3040")
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let database_path = PathBuf::from(var("DATABASE_PATH", "./classsync.db"));
        let asset_root = PathBuf::from(var("ASSET_ROOT", "./assets"));
        let public_asset_base_url = var("PUBLIC_ASSET_BASE_URL", "http://localhost:3040/assets")
            .trim_end_matches('/')
            .to_string();

        let sync_timeout_ms = match var("SYNC_TIMEOUT_MS", "30000").parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => return Err(ConfigError::InvalidTimeout),
        };

        let command_queue_bound = var("COMMAND_QUEUE_BOUND", "64")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(64);

        Ok(Config {
            host,
            port,
            database_path,
            asset_root,
            public_asset_base_url,
            sync_timeout_ms,
            command_queue_bound,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Runtime settings derived from this configuration.
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            command_queue_bound: self.command_queue_bound,
            sync_timeout_ms: self.sync_timeout_ms,
            ..RuntimeConfig::default()
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PORT` is not a `u16`.
    #[error("Invalid PORT environment variable")]
    InvalidPort,
    /// `SYNC_TIMEOUT_MS` is not a positive integer.
    #[error("Invalid SYNC_TIMEOUT_MS environment variable")]
    InvalidTimeout,
}
