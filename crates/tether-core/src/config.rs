//! Saved-server persistence
//!
//! The saved-server list lives in `servers.toml` under the platform config
//! dir. It is reloaded at startup and rewritten whenever the connected
//! registry changes, so the next launch can offer reconnection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ServerConfig;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

/// Get the default saved-server list path
pub fn saved_servers_path() -> PathBuf {
    default_config_dir().join("servers.toml")
}

/// On-disk shape of the saved-server list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedServers {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Durable store for the saved-server list
#[derive(Debug, Clone)]
pub struct ServerStore {
    path: PathBuf,
}

impl ServerStore {
    /// Store at the default platform location
    pub fn new() -> Self {
        Self {
            path: saved_servers_path(),
        }
    }

    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the saved list; a missing file is an empty list
    pub fn load(&self) -> Result<Vec<ServerConfig>, ConfigError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let saved: SavedServers = toml::from_str(&content)?;
        Ok(saved.servers)
    }

    /// Persist the full list, replacing the previous contents
    pub fn save(&self, servers: &[ServerConfig]) -> Result<(), ConfigError> {
        let saved = SavedServers {
            servers: servers.to_vec(),
        };
        let content = toml::to_string_pretty(&saved)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(&self.path, content)
            .map_err(|e| ConfigError::Invalid(format!("Failed to write {}: {}", self.path.display(), e)))?;
        Ok(())
    }

    /// Path this store reads and writes
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ServerStore {
    fn default() -> Self {
        Self::new()
    }
}
