//! Discovery engine
//!
//! Two passes run back to back with rising timeout/attempt budgets: the
//! first favors latency, the second recall. Within a pass the four
//! strategies run concurrently, candidates merge by host as they arrive,
//! and each merged candidate is verified by a bounded probe pool. Every
//! newly confirmed candidate triggers a fully re-ranked snapshot to the
//! caller. All pools are torn down at the pass deadline, so worst-case
//! latency is bounded even with probes outstanding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use tether_core::DiscoverySource;

use crate::candidate::{rank, Candidate, DiscoveredServer};
use crate::net;
use crate::probe::{probe_candidate, ProbeBudget, ProbeOutcome};

/// Timeout/attempt budget for one pass
#[derive(Debug, Clone, Copy)]
pub struct PassBudget {
    /// Hard deadline for the whole pass; pools are aborted when it expires
    pub window: Duration,
    /// Per-connect timeout inside probes and the subnet sweep
    pub probe_timeout: Duration,
    /// Attempts per probed port
    pub probe_attempts: u32,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Pass budgets, executed in order
    pub passes: Vec<PassBudget>,
    /// Concurrent reachability probes
    pub probe_pool: usize,
    /// Buffer size of the snapshot channel handed to the caller
    pub channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            passes: vec![
                PassBudget {
                    window: Duration::from_secs(2),
                    probe_timeout: Duration::from_millis(250),
                    probe_attempts: 1,
                },
                PassBudget {
                    window: Duration::from_secs(6),
                    probe_timeout: Duration::from_millis(900),
                    probe_attempts: 3,
                },
            ],
            probe_pool: 8,
            channel_capacity: 16,
        }
    }
}

/// Multi-strategy server discovery
#[derive(Clone)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    http: reqwest::Client,
}

impl DiscoveryEngine {
    /// Engine with default budgets
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default())
    }

    /// Engine with explicit budgets
    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Start a discovery run. The receiver yields a fully re-ranked snapshot
    /// every time a new candidate is confirmed; the first snapshot (the
    /// synthetic loopback and embedded-runtime entries) arrives immediately.
    /// Dropping the receiver cancels the run.
    pub fn run(&self) -> mpsc::Receiver<Vec<DiscoveredServer>> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(tx).await;
        });
        rx
    }

    async fn drive(&self, tx: mpsc::Sender<Vec<DiscoveredServer>>) {
        let device_name = gethostname::gethostname().to_string_lossy().into_owned();
        let synthetic = vec![
            DiscoveredServer::synthetic_local(&device_name),
            DiscoveredServer::synthetic_bundled(),
        ];

        let mut run = RunState {
            synthetic,
            confirmed: HashMap::new(),
        };

        if tx.send(run.snapshot()).await.is_err() {
            return;
        }

        for (index, pass) in self.config.passes.iter().enumerate() {
            tracing::debug!(pass = index + 1, window = ?pass.window, "Discovery pass starting");
            if self.run_pass(*pass, &mut run, &tx).await.is_err() {
                // Caller went away
                return;
            }
        }

        tracing::debug!(
            confirmed = run.confirmed.len(),
            "Discovery run complete"
        );
    }

    /// One pass: spawn strategies, merge candidates, probe, emit. Returns
    /// Err only when the caller dropped the receiver.
    async fn run_pass(
        &self,
        pass: PassBudget,
        run: &mut RunState,
        tx: &mpsc::Sender<Vec<DiscoveredServer>>,
    ) -> Result<(), ()> {
        let deadline = Instant::now() + pass.window;
        let device = net::device_ipv4();

        let (cand_tx, mut cand_rx) = mpsc::channel::<Candidate>(64);
        let mut strategies: JoinSet<()> = JoinSet::new();

        {
            let tx = cand_tx.clone();
            let window = pass.window;
            strategies.spawn(async move {
                crate::strategies::advert::browse(window, tx).await;
            });
        }
        {
            let tx = cand_tx.clone();
            let client = self.http.clone();
            let timeout = pass.window.min(Duration::from_secs(3));
            strategies.spawn(async move {
                crate::strategies::overlay::query(&client, timeout, tx).await;
            });
        }
        if let Some(device) = device {
            let tx = cand_tx.clone();
            let timeout = pass.probe_timeout;
            strategies.spawn(async move {
                crate::strategies::sweep::sweep(device, timeout, tx).await;
            });
        }
        {
            let tx = cand_tx.clone();
            strategies.spawn(async move {
                crate::strategies::neighbors::scan(tx).await;
            });
        }
        drop(cand_tx);

        let probe_sem = Arc::new(Semaphore::new(self.config.probe_pool));
        let mut probes: JoinSet<()> = JoinSet::new();
        let (result_tx, mut result_rx) = mpsc::channel::<(Candidate, ProbeOutcome)>(64);
        let budget = ProbeBudget {
            timeout: pass.probe_timeout,
            attempts: pass.probe_attempts,
        };

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut strategies_open = true;
        let mut pending_probes: usize = 0;

        loop {
            tokio::select! {
                maybe = cand_rx.recv(), if strategies_open => {
                    match maybe {
                        Some(raw) => {
                            if net::is_loopback_host(&raw.host) || net::is_self_host(&raw.host, device) {
                                continue;
                            }
                            let merged = match candidates.remove(&raw.host) {
                                Some(existing) => existing.merge(raw),
                                None => raw,
                            };
                            candidates.insert(merged.host.clone(), merged.clone());

                            let sem = Arc::clone(&probe_sem);
                            let result_tx = result_tx.clone();
                            pending_probes += 1;
                            probes.spawn(async move {
                                let Ok(_permit) = sem.acquire().await else {
                                    return;
                                };
                                let outcome = probe_candidate(&merged, budget).await;
                                let _ = result_tx.send((merged, outcome)).await;
                            });
                        }
                        None => strategies_open = false,
                    }
                }
                Some((candidate, outcome)) = result_rx.recv(), if pending_probes > 0 => {
                    pending_probes -= 1;
                    if run.confirm(candidate, outcome) {
                        if tx.send(run.snapshot()).await.is_err() {
                            return Err(());
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!("Pass deadline reached, tearing down pools");
                    break;
                }
                else => break,
            }

            if !strategies_open && pending_probes == 0 {
                break;
            }
        }

        strategies.abort_all();
        probes.abort_all();
        Ok(())
    }
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated state of one discovery run. Entries only grow or upgrade;
/// nothing is retroactively downgraded within a run.
struct RunState {
    synthetic: Vec<DiscoveredServer>,
    confirmed: HashMap<String, DiscoveredServer>,
}

impl RunState {
    /// Apply a probe outcome. Returns true when the result set changed.
    fn confirm(&mut self, candidate: Candidate, outcome: ProbeOutcome) -> bool {
        let entry = match outcome.agent_port {
            Some(port) => DiscoveredServer {
                host: candidate.host.clone(),
                name: candidate.name.clone(),
                source: candidate.source,
                port,
                agent_server: true,
            },
            None if outcome.shell_open => DiscoveredServer {
                host: candidate.host.clone(),
                name: candidate.name.clone(),
                // Advertisement evidence outranks a bare open shell
                source: if candidate.source == DiscoverySource::Advert {
                    DiscoverySource::Advert
                } else {
                    DiscoverySource::Shell
                },
                port: candidate.port_hint.unwrap_or(crate::AGENT_PORTS[0]),
                agent_server: false,
            },
            // No open port: only advertisement-sourced candidates are
            // retained, on the strength of the advertisement itself
            None if candidate.source == DiscoverySource::Advert => DiscoveredServer {
                host: candidate.host.clone(),
                name: candidate.name.clone(),
                source: DiscoverySource::Advert,
                port: candidate.port_hint.unwrap_or(crate::AGENT_PORTS[0]),
                agent_server: false,
            },
            None => return false,
        };

        match self.confirmed.get_mut(&entry.host) {
            Some(existing) => {
                let upgrades = entry.source.priority() < existing.source.priority()
                    || (entry.agent_server && !existing.agent_server)
                    || (existing.name.is_none() && entry.name.is_some());
                if !upgrades {
                    return false;
                }
                // Never downgrade: keep the stronger evidence of either side
                let agent_server = existing.agent_server || entry.agent_server;
                let name = entry.name.clone().or_else(|| existing.name.clone());
                *existing = DiscoveredServer {
                    agent_server,
                    name,
                    ..entry
                };
                true
            }
            None => {
                self.confirmed.insert(entry.host.clone(), entry);
                true
            }
        }
    }

    /// Ranked view of synthetic plus confirmed entries
    fn snapshot(&self) -> Vec<DiscoveredServer> {
        let mut servers: Vec<DiscoveredServer> = self
            .synthetic
            .iter()
            .cloned()
            .chain(self.confirmed.values().cloned())
            .collect();
        rank(&mut servers);
        servers
    }
}
