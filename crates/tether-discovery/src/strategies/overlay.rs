//! Overlay-network peer-status query
//!
//! Overlay daemons (Tailscale-style) expose peer status over HTTP at a fixed
//! virtual address reachable only from inside the overlay. Online peers are
//! candidates; the device's own node is excluded by the engine like any other
//! self address.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::mpsc;

use tether_core::DiscoverySource;

use crate::candidate::Candidate;

/// Well-known peer-status endpoint inside the overlay
pub const OVERLAY_STATUS_URL: &str = "http://100.100.100.100/api/status";

/// Peer-status response shape
#[derive(Debug, Deserialize)]
struct OverlayStatus {
    #[serde(default, rename = "Peers")]
    peers: Vec<OverlayPeer>,
}

#[derive(Debug, Deserialize)]
struct OverlayPeer {
    #[serde(default, rename = "HostName")]
    host_name: String,
    #[serde(default, rename = "Addrs")]
    addrs: Vec<String>,
    #[serde(default, rename = "Online")]
    online: bool,
}

/// Query the overlay daemon, streaming one candidate per online peer
pub async fn query(client: &reqwest::Client, timeout: Duration, tx: mpsc::Sender<Candidate>) {
    match fetch(client, timeout).await {
        Ok(candidates) => {
            for candidate in candidates {
                if tx.send(candidate).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            tracing::debug!("Overlay peer query failed: {:#}", e);
        }
    }
}

async fn fetch(client: &reqwest::Client, timeout: Duration) -> Result<Vec<Candidate>> {
    let status: OverlayStatus = client
        .get(OVERLAY_STATUS_URL)
        .timeout(timeout)
        .send()
        .await
        .context("overlay daemon unreachable")?
        .error_for_status()
        .context("overlay daemon rejected status query")?
        .json()
        .await
        .context("failed to parse overlay status JSON")?;

    Ok(peers_to_candidates(status))
}

fn peers_to_candidates(status: OverlayStatus) -> Vec<Candidate> {
    status
        .peers
        .into_iter()
        .filter(|peer| peer.online)
        .filter_map(|peer| {
            // Prefer the IPv4 overlay address
            let addr = peer
                .addrs
                .iter()
                .find(|a| !a.contains(':'))
                .or_else(|| peer.addrs.first())?
                .clone();
            Some(Candidate {
                host: addr,
                name: if peer.host_name.is_empty() {
                    None
                } else {
                    Some(peer.host_name)
                },
                source: DiscoverySource::Overlay,
                port_hint: None,
            })
        })
        .collect()
}
