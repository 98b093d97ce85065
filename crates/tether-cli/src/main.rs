//! Tether CLI
//!
//! Command-line client for agent-execution servers:
//! - Discover servers on the local network
//! - Connect to a server (or start and use the local runtime)
//! - List and follow conversation threads

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_client::{ConnectionCoordinator, ProcessLauncher, TcpConnector};
use tether_core::config::ServerStore;
use tether_core::{DiscoverySource, ServerConfig};
use tether_discovery::AGENT_PORTS;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "Client for Tether agent servers")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Command used to start the local runtime (for `local`)
    #[arg(long, global = true, default_value = "tether-agentd")]
    runtime_cmd: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover agent servers on the local network
    Discover {
        /// Keep printing refined snapshots as they arrive
        #[arg(short, long)]
        watch: bool,
    },

    /// Connect to a server and print its account state
    Connect {
        /// Server to connect to, as host or host:port
        target: String,
    },

    /// Start the local runtime and connect to it
    Local,

    /// List conversation threads on a server
    Threads {
        /// Server to query, as host or host:port
        target: String,
    },

    /// Send a message and stream the reply
    Send {
        /// Server to talk to, as host or host:port
        target: String,
        /// Message text
        message: String,
        /// Working directory for a new thread
        #[arg(short, long, default_value = ".")]
        cwd: String,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
        /// Attach a local image
        #[arg(long)]
        image: Option<String>,
    },

    /// List directories under a path on a server
    Dirs {
        /// Server to query, as host or host:port
        target: String,
        /// Remote path (defaults to the server-side home directory)
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Discover { watch } => commands::discover::run(watch).await,
        Commands::Connect { target } => {
            let coordinator = build_coordinator(&cli.runtime_cmd);
            commands::connect::run(&coordinator, parse_target(&target)?).await
        }
        Commands::Local => {
            let coordinator = build_coordinator(&cli.runtime_cmd);
            commands::connect::run_local(&coordinator).await
        }
        Commands::Threads { target } => {
            let coordinator = build_coordinator(&cli.runtime_cmd);
            commands::threads::run(&coordinator, parse_target(&target)?).await
        }
        Commands::Send {
            target,
            message,
            cwd,
            model,
            image,
        } => {
            let coordinator = build_coordinator(&cli.runtime_cmd);
            commands::send::run(&coordinator, parse_target(&target)?, message, cwd, model, image)
                .await
        }
        Commands::Dirs { target, path } => {
            let coordinator = build_coordinator(&cli.runtime_cmd);
            commands::dirs::run(&coordinator, parse_target(&target)?, path).await
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_coordinator(runtime_cmd: &str) -> ConnectionCoordinator {
    let command: Vec<String> = runtime_cmd
        .split_whitespace()
        .map(str::to_string)
        .collect();
    ConnectionCoordinator::spawn(
        Arc::new(TcpConnector::new()),
        Arc::new(ProcessLauncher::new(command, AGENT_PORTS[0])),
        ServerStore::new(),
    )
}

/// Parse `host` or `host:port` into a manual server config. Bracketed IPv6
/// literals keep their colons.
fn parse_target(target: &str) -> Result<ServerConfig> {
    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        // [v6]:port or [v6]
        match rest.split_once(']') {
            Some((host, "")) => (host.to_string(), AGENT_PORTS[0]),
            Some((host, suffix)) => {
                let port = suffix
                    .strip_prefix(':')
                    .context("expected :port after ]")?
                    .parse()
                    .context("invalid port")?;
                (host.to_string(), port)
            }
            None => anyhow::bail!("unterminated IPv6 literal in {target}"),
        }
    } else if let Some((host, port)) = target.rsplit_once(':') {
        if host.contains(':') {
            // Bare IPv6 literal with no port
            (target.to_string(), AGENT_PORTS[0])
        } else {
            (host.to_string(), port.parse().context("invalid port")?)
        }
    } else {
        (target.to_string(), AGENT_PORTS[0])
    };

    Ok(ServerConfig::new(
        host.clone(),
        host,
        port,
        DiscoverySource::Manual,
    ))
}
