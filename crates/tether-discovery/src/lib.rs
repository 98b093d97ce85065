//! tether-discovery: Multi-strategy local-network discovery of agent servers
//!
//! There is no central registry of agent servers, so the engine locates them
//! by running several heterogeneous probing strategies concurrently
//! (service-advertisement browsing, an overlay-network peer query, a bounded
//! subnet sweep, and a kernel neighbor-table scan), then merges, verifies,
//! and ranks the candidates. Callers receive progressively refined snapshots
//! as reachability is confirmed, not just a final list.

pub mod candidate;
pub mod engine;
pub mod net;
pub mod probe;
pub mod strategies;

pub use candidate::{Candidate, DiscoveredServer};
pub use engine::{DiscoveryConfig, DiscoveryEngine, PassBudget};
pub use probe::{ProbeBudget, ProbeOutcome};

/// Candidate agent-server ports, probed in priority order
pub const AGENT_PORTS: [u16; 2] = [4747, 4748];

/// Shell port checked as weak evidence of a reachable host
pub const SHELL_PORT: u16 = 22;
