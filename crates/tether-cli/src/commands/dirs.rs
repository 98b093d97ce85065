//! `tether dirs`

use anyhow::{Context, Result};

use tether_client::ConnectionCoordinator;
use tether_core::ServerConfig;

/// List directories under a remote path; an empty path means the remote
/// home directory
pub async fn run(
    coordinator: &ConnectionCoordinator,
    config: ServerConfig,
    path: String,
) -> Result<()> {
    coordinator
        .connect(config)
        .await
        .context("could not connect")?;

    let path = if path.is_empty() {
        coordinator
            .resolve_home_directory()
            .await
            .context("could not resolve remote home directory")?
    } else {
        path
    };

    let names = coordinator
        .list_directories(path.clone())
        .await
        .with_context(|| format!("could not list {}", path))?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}
