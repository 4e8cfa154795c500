//! Server configuration.
//!
//! Defaults can be overridden by a TOML file:
//!
//! ```toml
//! bind_address = "127.0.0.1:9090"
//! database_path = "/var/lib/pgo/profiles.db"
//! shutdown_grace = 10
//! log_level = "debug"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pgo_store::StoreConfig;
use pgo_store::config::DEFAULT_DATABASE_PATH;
use serde::{Deserialize, Deserializer};

use crate::error::ServerError;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default time allowed for in-flight requests after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub database_path: PathBuf,
    /// Keep profiles in memory instead of `database_path`.
    pub in_memory: bool,
    /// Seconds in the TOML file.
    #[serde(deserialize_with = "duration_from_secs")]
    pub shutdown_grace: Duration,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            in_memory: false,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load a configuration file; keys it omits keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            ServerError::Config(format!("Failed to parse config: {}: {e}", path.display()))
        })
    }

    /// Storage the server should open.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        if self.in_memory {
            StoreConfig::in_memory()
        } else {
            StoreConfig::at(&self.database_path)
        }
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
