//! `tether connect` and `tether local`

use anyhow::{Context, Result};

use tether_client::ConnectionCoordinator;
use tether_core::ServerConfig;
use tether_protocol::AuthMethod;

use crate::output::{print_info, print_success};

/// Connect to a server and report what we found there
pub async fn run(coordinator: &ConnectionCoordinator, config: ServerConfig) -> Result<()> {
    let endpoint = config.address().endpoint();
    let config = coordinator
        .connect(config)
        .await
        .with_context(|| format!("could not connect to {}", endpoint))?;
    print_success(&format!("Connected to {} ({})", config.name, endpoint));

    report_account(coordinator, &config);
    Ok(())
}

/// Start the local runtime and connect to it
pub async fn run_local(coordinator: &ConnectionCoordinator) -> Result<()> {
    let config = coordinator
        .connect_local_default()
        .await
        .context("could not start or reach the local runtime")?;
    print_success(&format!(
        "Local runtime ready on {}",
        config.address().endpoint()
    ));

    report_account(coordinator, &config);
    Ok(())
}

fn report_account(coordinator: &ConnectionCoordinator, config: &ServerConfig) {
    let state = coordinator.snapshot();
    let Some(account) = state.accounts.get(&config.id) else {
        return;
    };
    match account.auth_method {
        AuthMethod::NotLoggedIn => print_info("Not logged in"),
        method => {
            let email = account.email.as_deref().unwrap_or("<no email>");
            print_info(&format!("Logged in as {} ({:?})", email, method));
        }
    }
}
