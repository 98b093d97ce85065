//! Server addressing
//!
//! Servers are addressed as `scheme://host:port`. Numeric IPv6 literals are
//! bracketed so the port separator stays unambiguous.

use std::fmt;

use serde::{Deserialize, Serialize};

/// URL scheme for the persistent server socket
pub const DEFAULT_SCHEME: &str = "tether";

/// Host and port of an agent-execution server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Hostname or IP literal, unbracketed
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl ServerAddress {
    /// Create a new address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Render as `host:port`, bracketing numeric IPv6 literals
    pub fn endpoint(&self) -> String {
        if needs_brackets(&self.host) {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Render as a full URL with the given scheme
    pub fn url(&self, scheme: &str) -> String {
        format!("{}://{}", scheme, self.endpoint())
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// A bare colon marks a numeric IPv6 literal; already-bracketed hosts pass through
fn needs_brackets(host: &str) -> bool {
    host.contains(':') && !host.starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_ipv4() {
        let addr = ServerAddress::new("192.168.1.20", 4747);
        assert_eq!(addr.endpoint(), "192.168.1.20:4747");
    }

    #[test]
    fn test_endpoint_hostname() {
        let addr = ServerAddress::new("studio.local", 4747);
        assert_eq!(addr.endpoint(), "studio.local:4747");
    }

    #[test]
    fn test_endpoint_ipv6_bracketed() {
        let addr = ServerAddress::new("fe80::1", 4747);
        assert_eq!(addr.endpoint(), "[fe80::1]:4747");
    }

    #[test]
    fn test_endpoint_prebracketed_passthrough() {
        let addr = ServerAddress::new("[fe80::1]", 4747);
        assert_eq!(addr.endpoint(), "[fe80::1]:4747");
    }

    #[test]
    fn test_url() {
        let addr = ServerAddress::new("10.0.0.5", 22);
        assert_eq!(addr.url(DEFAULT_SCHEME), "tether://10.0.0.5:22");
    }
}
