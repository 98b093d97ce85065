//! `tether send`
//!
//! Sends one message and follows the store until the turn completes,
//! printing assistant output as it streams in.

use anyhow::{Context, Result};

use tether_client::ConnectionCoordinator;
use tether_core::{MessageRole, ModelSelection, ServerConfig, ThreadStatus};

use crate::output::{print_error, print_info};

pub async fn run(
    coordinator: &ConnectionCoordinator,
    config: ServerConfig,
    message: String,
    cwd: String,
    model: Option<String>,
    image: Option<String>,
) -> Result<()> {
    coordinator
        .connect(config)
        .await
        .context("could not connect")?;

    let mut updates = coordinator.store().subscribe();
    coordinator
        .send_message(
            message,
            Some(cwd),
            model.map(ModelSelection::model),
            image,
        )
        .await
        .context("send failed")?;

    // Follow the active thread: print assistant text as it grows, stop when
    // the turn completes or the thread errors out
    let mut printed = 0usize;
    loop {
        let (status, text, last_error) = {
            let state = updates.borrow_and_update();
            let Some(thread) = state.active_thread.as_ref().and_then(|k| state.thread(k)) else {
                anyhow::bail!("active thread disappeared");
            };
            let text = thread
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Assistant)
                .map(|m| m.text.clone())
                .unwrap_or_default();
            (thread.status, text, thread.last_error.clone())
        };

        // A fresh assistant message restarts the stream
        if text.len() < printed {
            println!();
            printed = 0;
        }
        if text.len() > printed {
            print!("{}", &text[printed..]);
            use std::io::Write;
            let _ = std::io::stdout().flush();
            printed = text.len();
        }

        match status {
            ThreadStatus::Ready => {
                println!();
                print_info("Turn complete");
                return Ok(());
            }
            ThreadStatus::Error => {
                println!();
                print_error(&format!(
                    "Turn failed: {}",
                    last_error.unwrap_or_else(|| "unknown error".to_string())
                ));
                anyhow::bail!("turn failed");
            }
            _ => {}
        }

        if updates.changed().await.is_err() {
            anyhow::bail!("coordinator shut down");
        }
    }
}
