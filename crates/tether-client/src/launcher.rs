//! Local runtime launcher
//!
//! Starting an embedded agent server is a collaborator concern: the
//! coordinator only needs start/stop/status and a listening port. Lifecycle
//! state lives in an explicit status object owned by the launcher, exposed
//! via query, never in process-wide flags.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use tether_core::TetherError;

/// Observable lifecycle state of the local runtime
#[derive(Debug, Clone, Default)]
pub struct RuntimeStatus {
    /// Whether a runtime process is running
    pub running: bool,
    /// Whether the runtime has accepted a readiness probe
    pub ready: bool,
    /// Listening port once ready
    pub port: Option<u16>,
    /// Most recent startup failure
    pub last_error: Option<String>,
}

/// Starts and stops a local agent-server process
#[async_trait]
pub trait RuntimeLauncher: Send + Sync {
    /// Ensure the runtime is running and ready; returns its listening port.
    /// Idempotent: a ready runtime is returned as-is.
    async fn start(&self) -> Result<u16, TetherError>;

    /// Stop the runtime if it is running
    async fn stop(&self);

    /// Current lifecycle state
    async fn status(&self) -> RuntimeStatus;
}

struct LauncherState {
    child: Option<Child>,
    status: RuntimeStatus,
}

/// Launcher that spawns a configured command and waits for its port to open
pub struct ProcessLauncher {
    command: Vec<String>,
    port: u16,
    ready_timeout: Duration,
    state: Mutex<LauncherState>,
}

impl ProcessLauncher {
    /// Launcher for `command` expected to listen on `port`
    pub fn new(command: Vec<String>, port: u16) -> Self {
        Self {
            command,
            port,
            ready_timeout: Duration::from_secs(20),
            state: Mutex::new(LauncherState {
                child: None,
                status: RuntimeStatus::default(),
            }),
        }
    }

    /// Override how long to wait for the port to open
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Poll the runtime port until it accepts a connection
    async fn await_ready(&self) -> bool {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        while tokio::time::Instant::now() < deadline {
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        false
    }
}

#[async_trait]
impl RuntimeLauncher for ProcessLauncher {
    async fn start(&self) -> Result<u16, TetherError> {
        let mut state = self.state.lock().await;

        // Already running and ready: nothing to do
        if let Some(child) = state.child.as_mut() {
            let exited = child.try_wait().ok().flatten().is_some();
            if !exited && state.status.ready {
                return Ok(self.port);
            }
            if exited {
                tracing::warn!("Local runtime exited, restarting");
                state.child = None;
                state.status = RuntimeStatus::default();
            }
        }

        if state.child.is_none() {
            let (program, args) = self
                .command
                .split_first()
                .ok_or_else(|| TetherError::Launcher("empty runtime command".to_string()))?;
            tracing::info!("Starting local runtime: {}", self.command.join(" "));

            let child = Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    let message = format!("spawn failed: {}", e);
                    state.status.last_error = Some(message.clone());
                    TetherError::Launcher(message)
                })?;
            state.child = Some(child);
            state.status.running = true;
            state.status.last_error = None;
        }

        if self.await_ready().await {
            state.status.ready = true;
            state.status.port = Some(self.port);
            tracing::info!("Local runtime ready on port {}", self.port);
            Ok(self.port)
        } else {
            let message = format!("runtime did not open port {} in time", self.port);
            if let Some(mut child) = state.child.take() {
                let _ = child.kill().await;
            }
            state.status = RuntimeStatus {
                last_error: Some(message.clone()),
                ..RuntimeStatus::default()
            };
            Err(TetherError::Launcher(message))
        }
    }

    async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut child) = state.child.take() {
            tracing::info!("Stopping local runtime");
            let _ = child.kill().await;
        }
        state.status = RuntimeStatus::default();
    }

    async fn status(&self) -> RuntimeStatus {
        self.state.lock().await.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let launcher = ProcessLauncher::new(vec![], 4747);
        let err = launcher.start().await.unwrap_err();
        assert!(matches!(err, TetherError::Launcher(_)));
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let launcher = ProcessLauncher::new(vec!["true".to_string()], 4747);
        let status = launcher.status().await;
        assert!(!status.running);
        assert!(!status.ready);
        assert!(status.port.is_none());
    }

    #[tokio::test]
    async fn test_unready_runtime_reports_error() {
        // `sleep` never opens the port, so readiness must time out and the
        // failure must land on the status object.
        let launcher = ProcessLauncher::new(
            vec!["sleep".to_string(), "5".to_string()],
            1, // reserved port nothing listens on
        )
        .with_ready_timeout(Duration::from_millis(300));

        let err = launcher.start().await.unwrap_err();
        assert!(matches!(err, TetherError::Launcher(_)));

        let status = launcher.status().await;
        assert!(!status.ready);
        assert!(status.last_error.is_some());
    }
}
