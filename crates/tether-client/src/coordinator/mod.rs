//! Connection coordinator
//!
//! The public [`ConnectionCoordinator`] is a cheap handle over an op queue.
//! One worker task owns the server/thread/account registries and processes
//! every mutating operation serially; strict serialization under a single
//! owner is the correctness mechanism, not locks. Notifications from every
//! connected transport funnel into the same queue, so their effects are
//! serialized with direct operations too.
//!
//! Completion is delivered through per-operation oneshot replies, so callers
//! observe results on their own context while the worker moves on. Once
//! closed, the coordinator rejects further submissions with
//! [`TetherError::Closed`].

mod notifications;
mod worker;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use tether_core::{
    config::ServerStore, ModelSelection, ServerConfig, ServerId, TetherError, ThreadKey,
};
use tether_protocol::{ModelInfo, Notification};

use crate::launcher::RuntimeLauncher;
use crate::store::StateStore;
use crate::transport::Connector;
use worker::Worker;

/// Queue depth of the op channel; ops are small and the worker drains fast
const OP_QUEUE_DEPTH: usize = 128;

type Reply<T> = oneshot::Sender<Result<T, TetherError>>;

/// What to disconnect
#[derive(Debug, Clone)]
pub enum DisconnectTarget {
    Server(ServerId),
    All,
}

pub(crate) enum Op {
    ConnectLocalDefault {
        reply: Reply<ServerConfig>,
    },
    Connect {
        config: ServerConfig,
        reply: Reply<ServerConfig>,
    },
    ReconnectSaved {
        reply: Reply<Vec<ServerConfig>>,
    },
    Disconnect {
        target: DisconnectTarget,
        reply: Reply<()>,
    },
    RefreshSessions {
        server: Option<ServerId>,
        reply: Reply<()>,
    },
    LoadModels {
        server: Option<ServerId>,
        reply: Reply<Vec<ModelInfo>>,
    },
    StartThread {
        cwd: String,
        model: Option<ModelSelection>,
        reply: Reply<ThreadKey>,
    },
    ResumeThread {
        server: ServerId,
        thread_id: String,
        cwd: String,
        reply: Reply<ThreadKey>,
    },
    SelectThread {
        key: ThreadKey,
        cwd: Option<String>,
        reply: Reply<()>,
    },
    SendMessage {
        text: String,
        cwd: Option<String>,
        model: Option<ModelSelection>,
        image: Option<String>,
        reply: Reply<()>,
    },
    Interrupt {
        reply: Reply<()>,
    },
    ResolveHome {
        reply: Reply<String>,
    },
    ListDirectories {
        path: String,
        reply: Reply<Vec<String>>,
    },
    LoginStart {
        server: ServerId,
        reply: Reply<String>,
    },
    LoginCancel {
        server: ServerId,
        reply: Reply<()>,
    },
    Logout {
        server: ServerId,
        reply: Reply<()>,
    },
    Notify {
        server: ServerId,
        notification: Notification,
    },
    Close {
        reply: Reply<()>,
    },
}

/// Handle to the coordinator worker
#[derive(Clone)]
pub struct ConnectionCoordinator {
    ops: mpsc::Sender<Op>,
    store: StateStore,
}

impl ConnectionCoordinator {
    /// Spawn the worker and return a handle to it
    pub fn spawn(
        connector: Arc<dyn Connector>,
        launcher: Arc<dyn RuntimeLauncher>,
        server_store: ServerStore,
    ) -> Self {
        let store = StateStore::new();
        let (ops_tx, ops_rx) = mpsc::channel(OP_QUEUE_DEPTH);

        let worker = Worker::new(
            store.clone(),
            connector,
            launcher,
            server_store,
            ops_tx.clone(),
        );
        tokio::spawn(worker.run(ops_rx));

        Self { ops: ops_tx, store }
    }

    /// The store publishing state snapshots
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> Arc<tether_core::AppState> {
        self.store.snapshot()
    }

    async fn submit<T>(&self, make: impl FnOnce(Reply<T>) -> Op) -> Result<T, TetherError> {
        let (tx, rx) = oneshot::channel();
        self.ops
            .send(make(tx))
            .await
            .map_err(|_| TetherError::Closed)?;
        rx.await.map_err(|_| TetherError::Closed)?
    }

    /// Ensure the local runtime is running and connect to it
    pub async fn connect_local_default(&self) -> Result<ServerConfig, TetherError> {
        self.submit(|reply| Op::ConnectLocalDefault { reply }).await
    }

    /// Connect to a server. Idempotent for an already-connected server id.
    pub async fn connect(&self, config: ServerConfig) -> Result<ServerConfig, TetherError> {
        self.submit(|reply| Op::Connect { config, reply }).await
    }

    /// Reconnect every saved server; each attempt is fault-isolated.
    /// Returns the set of successes.
    pub async fn reconnect_saved(&self) -> Result<Vec<ServerConfig>, TetherError> {
        self.submit(|reply| Op::ReconnectSaved { reply }).await
    }

    /// Disconnect one server or all of them
    pub async fn disconnect(&self, target: DisconnectTarget) -> Result<(), TetherError> {
        self.submit(|reply| Op::Disconnect { target, reply }).await
    }

    /// List remote threads and merge them into the registry
    pub async fn refresh_sessions(&self, server: Option<ServerId>) -> Result<(), TetherError> {
        self.submit(|reply| Op::RefreshSessions { server, reply })
            .await
    }

    /// List models and update the default selection
    pub async fn load_models(&self, server: Option<ServerId>) -> Result<Vec<ModelInfo>, TetherError> {
        self.submit(|reply| Op::LoadModels { server, reply }).await
    }

    /// Start a new thread on the active server
    pub async fn start_thread(
        &self,
        cwd: String,
        model: Option<ModelSelection>,
    ) -> Result<ThreadKey, TetherError> {
        self.submit(|reply| Op::StartThread { cwd, model, reply })
            .await
    }

    /// Resume a known thread, reconstructing its message history
    pub async fn resume_thread(
        &self,
        server: ServerId,
        thread_id: String,
        cwd: String,
    ) -> Result<ThreadKey, TetherError> {
        self.submit(|reply| Op::ResumeThread {
            server,
            thread_id,
            cwd,
            reply,
        })
        .await
    }

    /// Make a thread active; a thread with no cached messages is lazily
    /// resumed first
    pub async fn select_thread(
        &self,
        key: ThreadKey,
        cwd: Option<String>,
    ) -> Result<(), TetherError> {
        self.submit(|reply| Op::SelectThread { key, cwd, reply })
            .await
    }

    /// Send a message on the active thread, creating one when none is
    /// active. An explicit `image` path wins over an embedded marker in the
    /// text.
    pub async fn send_message(
        &self,
        text: String,
        cwd: Option<String>,
        model: Option<ModelSelection>,
        image: Option<String>,
    ) -> Result<(), TetherError> {
        self.submit(|reply| Op::SendMessage {
            text,
            cwd,
            model,
            image,
            reply,
        })
        .await
    }

    /// Interrupt the active thread's turn
    pub async fn interrupt(&self) -> Result<(), TetherError> {
        self.submit(|reply| Op::Interrupt { reply }).await
    }

    /// Resolve the home directory on the active server
    pub async fn resolve_home_directory(&self) -> Result<String, TetherError> {
        self.submit(|reply| Op::ResolveHome { reply }).await
    }

    /// List directory names under `path` on the active server, sorted
    pub async fn list_directories(&self, path: String) -> Result<Vec<String>, TetherError> {
        self.submit(|reply| Op::ListDirectories { path, reply })
            .await
    }

    /// Begin an interactive login; returns the OAuth URL to present
    pub async fn login_start(&self, server: ServerId) -> Result<String, TetherError> {
        self.submit(|reply| Op::LoginStart { server, reply }).await
    }

    /// Cancel a pending interactive login
    pub async fn login_cancel(&self, server: ServerId) -> Result<(), TetherError> {
        self.submit(|reply| Op::LoginCancel { server, reply }).await
    }

    /// Log the account out of a server
    pub async fn logout(&self, server: ServerId) -> Result<(), TetherError> {
        self.submit(|reply| Op::Logout { server, reply }).await
    }

    /// Tear everything down. Subsequent operations fail with `Closed`.
    pub async fn close(&self) -> Result<(), TetherError> {
        self.submit(|reply| Op::Close { reply }).await
    }
}
