//! Bounded local-subnet sweep
//!
//! Walks the device's /24, attempting one short TCP connect to the primary
//! agent port per host. The pool is bounded to tens of workers so a sweep
//! never floods the interface, and the whole strategy is abandoned at the
//! pass deadline along with everything else.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use tether_core::DiscoverySource;

use crate::candidate::Candidate;
use crate::AGENT_PORTS;

/// Concurrent connect attempts during a sweep
pub const SWEEP_POOL: usize = 48;

/// Sweep the /24 around `device`, streaming a candidate per responding host
pub async fn sweep(device: Ipv4Addr, per_host_timeout: Duration, tx: mpsc::Sender<Candidate>) {
    let octets = device.octets();
    let semaphore = Arc::new(Semaphore::new(SWEEP_POOL));
    let mut tasks = JoinSet::new();

    for last in 1..=254u8 {
        if last == octets[3] {
            continue;
        }
        let host = Ipv4Addr::new(octets[0], octets[1], octets[2], last);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let connect = TcpStream::connect((host, AGENT_PORTS[0]));
            if let Ok(Ok(stream)) = tokio::time::timeout(per_host_timeout, connect).await {
                drop(stream);
                let _ = tx
                    .send(Candidate {
                        host: host.to_string(),
                        name: None,
                        source: DiscoverySource::Lan,
                        port_hint: Some(AGENT_PORTS[0]),
                    })
                    .await;
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}
