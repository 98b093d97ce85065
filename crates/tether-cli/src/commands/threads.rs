//! `tether threads`

use anyhow::{Context, Result};

use tether_client::ConnectionCoordinator;
use tether_core::ServerConfig;

use crate::output::format_threads;

/// Connect, pull the thread list, and print it
pub async fn run(coordinator: &ConnectionCoordinator, config: ServerConfig) -> Result<()> {
    let config = coordinator
        .connect(config)
        .await
        .context("could not connect")?;
    coordinator
        .refresh_sessions(Some(config.id))
        .await
        .context("could not list threads")?;

    let state = coordinator.snapshot();
    println!("{}", format_threads(&state.threads));
    Ok(())
}
