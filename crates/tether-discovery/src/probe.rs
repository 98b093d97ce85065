//! Per-candidate reachability verification
//!
//! A merged candidate is only evidence of a host; this module checks whether
//! anything useful answers there. The shell port is checked first as weak
//! reachability evidence, then the recognized agent ports in priority order.
//! Every check retries a bounded number of times with short sleeps, since
//! sleepy devices often drop the first SYN.

use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;

use tether_core::DiscoverySource;

use crate::candidate::Candidate;
use crate::{AGENT_PORTS, SHELL_PORT};

/// Retry budget for one candidate's port checks
#[derive(Debug, Clone, Copy)]
pub struct ProbeBudget {
    /// Per-connect timeout
    pub timeout: Duration,
    /// Attempts per port
    pub attempts: u32,
}

/// What answered on a candidate host
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeOutcome {
    /// First agent port that accepted a connection
    pub agent_port: Option<u16>,
    pub shell_open: bool,
}

/// Probe one candidate. Advertisement-sourced candidates get a doubled
/// attempt budget on agent ports: discovery signal alone is weaker evidence,
/// so it is worth waiting out a slow service start.
pub async fn probe_candidate(candidate: &Candidate, budget: ProbeBudget) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    outcome.shell_open = port_answers(&candidate.host, SHELL_PORT, budget).await;

    let agent_budget = if candidate.source == DiscoverySource::Advert {
        ProbeBudget {
            attempts: budget.attempts * 2,
            ..budget
        }
    } else {
        budget
    };

    // The advertised port, when present, outranks the fixed candidates
    let mut ports: Vec<u16> = Vec::with_capacity(AGENT_PORTS.len() + 1);
    if let Some(hint) = candidate.port_hint {
        ports.push(hint);
    }
    for port in AGENT_PORTS {
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    for port in ports {
        if port_answers(&candidate.host, port, agent_budget).await {
            outcome.agent_port = Some(port);
            break;
        }
    }

    outcome
}

/// Whether a TCP connect to `host:port` succeeds within the budget
async fn port_answers(host: &str, port: u16, budget: ProbeBudget) -> bool {
    for attempt in 0..budget.attempts.max(1) {
        if attempt > 0 {
            let jitter = rand::thread_rng().gen_range(0..50);
            tokio::time::sleep(Duration::from_millis(50 + jitter)).await;
        }
        let connect = TcpStream::connect((host, port));
        if let Ok(Ok(stream)) = tokio::time::timeout(budget.timeout, connect).await {
            drop(stream);
            return true;
        }
    }
    false
}
