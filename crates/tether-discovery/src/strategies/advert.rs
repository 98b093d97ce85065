//! Service-advertisement (DNS-SD) browsing
//!
//! Browses the two Tether service types through the system `avahi-browse`
//! tool and parses its machine-readable output. Hosts that advertise either
//! type are strong candidates: the advertisement carries the instance name
//! and the listening port.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::mpsc;

use tether_core::DiscoverySource;

use crate::candidate::Candidate;

/// Browsed service types, agent first
pub const SERVICE_TYPES: [&str; 2] = ["_tether._tcp", "_tether-agent._tcp"];

/// Browse both service types, streaming candidates as they resolve
pub async fn browse(window: Duration, tx: mpsc::Sender<Candidate>) {
    for service in SERVICE_TYPES {
        match browse_one(service, window).await {
            Ok(candidates) => {
                for candidate in candidates {
                    if tx.send(candidate).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Service browse of {} failed: {:#}", service, e);
            }
        }
    }
}

async fn browse_one(service: &str, window: Duration) -> Result<Vec<Candidate>> {
    let output = tokio::time::timeout(
        window,
        Command::new("avahi-browse")
            .args(["--terminate", "--resolve", "--parsable", service])
            .output(),
    )
    .await
    .context("browse timed out")?
    .context("failed to run avahi-browse")?;

    if !output.status.success() {
        anyhow::bail!(
            "avahi-browse exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(parse_browse_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `avahi-browse --parsable` output. Resolved entries start with `=`
/// and carry semicolon-separated fields:
/// `=;iface;proto;name;type;domain;hostname;address;port;txt`
fn parse_browse_output(stdout: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for line in stdout.lines() {
        if !line.starts_with('=') {
            continue;
        }
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < 9 {
            continue;
        }
        let name = unescape(fields[3]);
        let address = fields[7].trim();
        if address.is_empty() {
            continue;
        }
        let port = fields[8].trim().parse::<u16>().ok();

        candidates.push(Candidate {
            host: address.to_string(),
            name: if name.is_empty() { None } else { Some(name) },
            source: DiscoverySource::Advert,
            port_hint: port,
        });
    }
    candidates
}

/// Undo avahi's `\NNN` decimal escaping of instance names
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 && digits.chars().all(|d| d.is_ascii_digit()) {
            if let Some(code) = digits.parse::<u32>().ok().and_then(char::from_u32) {
                out.push(code);
                for _ in 0..3 {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}
