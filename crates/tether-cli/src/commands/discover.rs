//! `tether discover`

use anyhow::Result;

use tether_discovery::DiscoveryEngine;

use crate::output::{format_discovered, print_info};

/// Run a discovery sweep. With `watch`, every refined snapshot is printed as
/// it arrives; otherwise only the final ranking is shown.
pub async fn run(watch: bool) -> Result<()> {
    print_info("Discovering agent servers...");

    let engine = DiscoveryEngine::new();
    let mut snapshots = engine.run();

    let mut last = Vec::new();
    while let Some(snapshot) = snapshots.recv().await {
        if watch {
            println!("{}", format_discovered(&snapshot));
        }
        last = snapshot;
    }

    if !watch {
        println!("{}", format_discovered(&last));
    }
    print_info(&format!("{} server(s) found", last.len()));
    Ok(())
}
