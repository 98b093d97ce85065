//! Discovery candidates and confirmed results

use tether_core::{DiscoverySource, ServerConfig, ServerId};

use crate::AGENT_PORTS;

/// An unconfirmed host reported by one strategy, awaiting reachability
/// verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host: String,
    pub name: Option<String>,
    pub source: DiscoverySource,
    /// Port the strategy observed, when it observed one
    pub port_hint: Option<u16>,
}

impl Candidate {
    /// A bare candidate with neither name nor port hint
    pub fn bare(host: impl Into<String>, source: DiscoverySource) -> Self {
        Self {
            host: host.into(),
            name: None,
            source,
            port_hint: None,
        }
    }

    /// Merge two sightings of the same host: the higher-priority source wins
    /// the record, and missing name/port-hint fields backfill from the loser.
    pub fn merge(self, other: Candidate) -> Candidate {
        let (mut winner, loser) = if other.source.priority() < self.source.priority() {
            (other, self)
        } else {
            (self, other)
        };
        if winner.name.is_none() {
            winner.name = loser.name;
        }
        if winner.port_hint.is_none() {
            winner.port_hint = loser.port_hint;
        }
        winner
    }
}

/// A candidate whose reachability has been assessed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub host: String,
    pub name: Option<String>,
    pub source: DiscoverySource,
    pub port: u16,
    /// Whether an agent port answered (as opposed to shell-only or
    /// advertisement-only evidence)
    pub agent_server: bool,
}

impl DiscoveredServer {
    /// Synthetic loopback entry for this device
    pub fn synthetic_local(device_name: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            name: Some(device_name.to_string()),
            source: DiscoverySource::Local,
            port: AGENT_PORTS[0],
            agent_server: true,
        }
    }

    /// Synthetic entry for the launcher-managed embedded runtime
    pub fn synthetic_bundled() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            name: Some("Embedded runtime".to_string()),
            source: DiscoverySource::Bundled,
            port: AGENT_PORTS[0],
            agent_server: true,
        }
    }

    /// Convert into a connectable server config
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig {
            id: ServerId::from_endpoint(&self.host, self.port),
            name: self
                .name
                .clone()
                .unwrap_or_else(|| self.host.clone()),
            host: self.host.clone(),
            port: self.port,
            source: self.source,
            agent_server: self.agent_server,
        }
    }
}

/// Rank a result list in place: fixed source priority first, then
/// case-insensitive name, then host for stability.
pub fn rank(servers: &mut [DiscoveredServer]) {
    servers.sort_by(|a, b| {
        let a_name = a.name.as_deref().unwrap_or(&a.host).to_lowercase();
        let b_name = b.name.as_deref().unwrap_or(&b.host).to_lowercase();
        (a.source.priority(), a_name, &a.host).cmp(&(b.source.priority(), b_name, &b.host))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_higher_priority_wins_with_backfill() {
        let lan = Candidate {
            host: "10.0.0.5".to_string(),
            name: None,
            source: DiscoverySource::Lan,
            port_hint: Some(4747),
        };
        let advert = Candidate {
            host: "10.0.0.5".to_string(),
            name: Some("studio.local".to_string()),
            source: DiscoverySource::Advert,
            port_hint: None,
        };

        let merged = lan.merge(advert);
        assert_eq!(merged.source, DiscoverySource::Advert);
        assert_eq!(merged.name.as_deref(), Some("studio.local"));
        // port hint backfilled from the losing sighting
        assert_eq!(merged.port_hint, Some(4747));
    }

    #[test]
    fn test_merge_is_order_independent_on_source() {
        let a = Candidate::bare("10.0.0.9", DiscoverySource::Overlay);
        let b = Candidate::bare("10.0.0.9", DiscoverySource::Neighbor);
        assert_eq!(a.clone().merge(b.clone()).source, DiscoverySource::Overlay);
        assert_eq!(b.merge(a).source, DiscoverySource::Overlay);
    }

    #[test]
    fn test_rank_by_source_then_name() {
        let mut servers = vec![
            DiscoveredServer {
                host: "10.0.0.2".to_string(),
                name: Some("zeta".to_string()),
                source: DiscoverySource::Advert,
                port: 4747,
                agent_server: true,
            },
            DiscoveredServer {
                host: "10.0.0.3".to_string(),
                name: Some("Alpha".to_string()),
                source: DiscoverySource::Advert,
                port: 4747,
                agent_server: true,
            },
            DiscoveredServer::synthetic_bundled(),
            DiscoveredServer::synthetic_local("mybox"),
        ];
        rank(&mut servers);

        assert_eq!(servers[0].source, DiscoverySource::Local);
        assert_eq!(servers[1].source, DiscoverySource::Bundled);
        assert_eq!(servers[2].name.as_deref(), Some("Alpha"));
        assert_eq!(servers[3].name.as_deref(), Some("zeta"));
    }
}
