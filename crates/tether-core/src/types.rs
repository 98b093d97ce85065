//! Core domain types

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_protocol::ServerAddress;

/// Unique identifier for a connected or saved server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    /// Create a new server ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the conventional ID for a host/port pair
    pub fn from_endpoint(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Compound identity of a thread: the owning server plus the server-scoped
/// thread id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub server: ServerId,
    pub thread_id: String,
}

impl ThreadKey {
    /// Create a new thread key
    pub fn new(server: ServerId, thread_id: impl Into<String>) -> Self {
        Self {
            server,
            thread_id: thread_id.into(),
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.thread_id)
    }
}

/// Global connection status of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ready => write!(f, "ready"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle status of one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Idle, ready to accept a turn
    Ready,
    /// Being started or resumed
    Connecting,
    /// A turn is executing
    Thinking,
    /// Last operation on this thread failed
    Error,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Ready => write!(f, "ready"),
            ThreadStatus::Connecting => write!(f, "connecting"),
            ThreadStatus::Thinking => write!(f, "thinking"),
            ThreadStatus::Error => write!(f, "error"),
        }
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Reasoning,
}

/// How a server entered the registry or a discovery result set.
///
/// Ordering is the ranking priority: lower ranks sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    /// Loopback server on this device
    Local,
    /// Bundled embedded runtime managed by the launcher
    Bundled,
    /// Service-advertisement (DNS-SD) browse
    Advert,
    /// Overlay-network peer status
    Overlay,
    /// Only the shell port answered
    Shell,
    /// Local-subnet sweep
    Lan,
    /// Kernel neighbor-table scan
    Neighbor,
    /// Entered by hand
    Manual,
}

impl DiscoverySource {
    /// Ranking priority; lower wins. Subnet-sweep and neighbor-scan share a
    /// tier since neither carries more evidence than the other.
    pub fn priority(self) -> u8 {
        match self {
            DiscoverySource::Local => 0,
            DiscoverySource::Bundled => 1,
            DiscoverySource::Advert => 2,
            DiscoverySource::Overlay => 3,
            DiscoverySource::Shell => 4,
            DiscoverySource::Lan | DiscoverySource::Neighbor => 5,
            DiscoverySource::Manual => 6,
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Local => write!(f, "local"),
            DiscoverySource::Bundled => write!(f, "bundled"),
            DiscoverySource::Advert => write!(f, "advert"),
            DiscoverySource::Overlay => write!(f, "overlay"),
            DiscoverySource::Shell => write!(f, "shell"),
            DiscoverySource::Lan => write!(f, "lan"),
            DiscoverySource::Neighbor => write!(f, "neighbor"),
            DiscoverySource::Manual => write!(f, "manual"),
        }
    }
}

/// A server the client knows how to reach. Effectively immutable once
/// connected; a changed port yields a new config (and a new id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub source: DiscoverySource,
    /// Whether an agent server (not just a shell) answered on this host
    pub agent_server: bool,
}

impl ServerConfig {
    /// Create a config, deriving the id from the endpoint
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, source: DiscoverySource) -> Self {
        let host = host.into();
        Self {
            id: ServerId::from_endpoint(&host, port),
            name: name.into(),
            host,
            port,
            source,
            agent_server: true,
        }
    }

    /// Wire address of this server
    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }
}

/// A model choice, optionally carrying an explicit reasoning-effort override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model: String,
    #[serde(default)]
    pub effort: Option<String>,
}

impl ModelSelection {
    /// Select a model with no effort override
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            effort: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_from_endpoint() {
        let id = ServerId::from_endpoint("10.0.0.5", 4747);
        assert_eq!(id.as_str(), "10.0.0.5:4747");
    }

    #[test]
    fn test_thread_key_display() {
        let key = ThreadKey::new(ServerId::new("local"), "t-9");
        assert_eq!(key.to_string(), "local/t-9");
    }

    #[test]
    fn test_source_priority_order() {
        let ranked = [
            DiscoverySource::Local,
            DiscoverySource::Bundled,
            DiscoverySource::Advert,
            DiscoverySource::Overlay,
            DiscoverySource::Shell,
            DiscoverySource::Lan,
            DiscoverySource::Manual,
        ];
        for pair in ranked.windows(2) {
            assert!(pair[0].priority() <= pair[1].priority());
        }
        assert_eq!(
            DiscoverySource::Lan.priority(),
            DiscoverySource::Neighbor.priority()
        );
    }

    #[test]
    fn test_server_config_address() {
        let config = ServerConfig::new("studio", "fe80::1", 4747, DiscoverySource::Manual);
        assert_eq!(config.address().endpoint(), "[fe80::1]:4747");
        assert_eq!(config.id.as_str(), "fe80::1:4747");
    }
}
