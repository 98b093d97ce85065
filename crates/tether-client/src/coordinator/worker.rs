//! Coordinator worker
//!
//! Owns every registry (servers, threads, accounts, transports) and applies
//! all mutations serially from the op queue. After each op it projects a
//! fresh `AppState` snapshot into the store. Nothing else may touch these
//! maps.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tether_core::{
    config::ServerStore, time::now_millis, AccountState, AppState, ChatMessage, ConnectError,
    ConnectionStatus, DiscoverySource, MessageRole, ModelSelection, ServerConfig, ServerId,
    TetherError, ThreadError, ThreadKey, ThreadState, ThreadStatus,
};
use tether_protocol::{
    is_sandbox_unavailable, method, AccountReadResponse, CommandExecParams, CommandExecResponse,
    InitializeParams, InitializeResponse, LoginStartResponse, ModelListResponse, ProtocolError,
    SandboxMode, ThreadListResponse, ThreadResumeParams, ThreadResumeResponse, ThreadStartParams,
    ThreadStartResponse, ThreadSummary, TurnInterruptParams, TurnStartParams, TurnStartResponse,
};
use tether_protocol::{ModelInfo, Notification};

use crate::launcher::RuntimeLauncher;
use crate::messages::{reconstruct_history, OutgoingMessage};
use crate::store::StateStore;
use crate::transport::{call, Connector, RpcTransport};

use super::{DisconnectTarget, Op};

/// Client identity sent in the handshake
const CLIENT_NAME: &str = "tether";

struct ServerEntry {
    config: ServerConfig,
    transport: Arc<dyn RpcTransport>,
    notify_task: JoinHandle<()>,
}

pub(super) struct Worker {
    store: StateStore,
    connector: Arc<dyn Connector>,
    launcher: Arc<dyn RuntimeLauncher>,
    server_store: ServerStore,
    /// Handle back into our own queue, used by notification pumps
    ops_tx: mpsc::Sender<Op>,

    servers: HashMap<ServerId, ServerEntry>,
    pub(super) threads: HashMap<ThreadKey, ThreadState>,
    pub(super) accounts: HashMap<ServerId, AccountState>,
    models: Vec<ModelInfo>,
    selected_model: Option<ModelSelection>,

    pub(super) active_server: Option<ServerId>,
    pub(super) active_thread: Option<ThreadKey>,
    connection_status: ConnectionStatus,
    connection_error: Option<String>,
}

impl Worker {
    pub(super) fn new(
        store: StateStore,
        connector: Arc<dyn Connector>,
        launcher: Arc<dyn RuntimeLauncher>,
        server_store: ServerStore,
        ops_tx: mpsc::Sender<Op>,
    ) -> Self {
        Self {
            store,
            connector,
            launcher,
            server_store,
            ops_tx,
            servers: HashMap::new(),
            threads: HashMap::new(),
            accounts: HashMap::new(),
            models: Vec::new(),
            selected_model: None,
            active_server: None,
            active_thread: None,
            connection_status: ConnectionStatus::Disconnected,
            connection_error: None,
        }
    }

    pub(super) async fn run(mut self, mut ops: mpsc::Receiver<Op>) {
        tracing::debug!("Coordinator worker started");
        while let Some(op) = ops.recv().await {
            let stop = self.handle(op).await;
            self.commit();
            if stop {
                break;
            }
        }
        tracing::debug!("Coordinator worker stopped");
    }

    async fn handle(&mut self, op: Op) -> bool {
        match op {
            Op::ConnectLocalDefault { reply } => {
                let result = self.connect_local_default().await;
                let _ = reply.send(result);
            }
            Op::Connect { config, reply } => {
                let result = self.connect(config).await;
                let _ = reply.send(result);
            }
            Op::ReconnectSaved { reply } => {
                let result = self.reconnect_saved().await;
                let _ = reply.send(result);
            }
            Op::Disconnect { target, reply } => {
                let result = self.disconnect(target).await;
                let _ = reply.send(result);
            }
            Op::RefreshSessions { server, reply } => {
                let result = self.refresh_sessions(server).await;
                let _ = reply.send(result);
            }
            Op::LoadModels { server, reply } => {
                let result = self.load_models(server).await;
                let _ = reply.send(result);
            }
            Op::StartThread { cwd, model, reply } => {
                let result = self.start_thread(cwd, model).await;
                let _ = reply.send(result);
            }
            Op::ResumeThread {
                server,
                thread_id,
                cwd,
                reply,
            } => {
                let result = self.resume_thread(server, thread_id, cwd).await;
                let _ = reply.send(result);
            }
            Op::SelectThread { key, cwd, reply } => {
                let result = self.select_thread(key, cwd).await;
                let _ = reply.send(result);
            }
            Op::SendMessage {
                text,
                cwd,
                model,
                image,
                reply,
            } => {
                let result = self.send_message(text, cwd, model, image).await;
                let _ = reply.send(result);
            }
            Op::Interrupt { reply } => {
                let result = self.interrupt().await;
                let _ = reply.send(result);
            }
            Op::ResolveHome { reply } => {
                let result = self.resolve_home_directory().await;
                let _ = reply.send(result);
            }
            Op::ListDirectories { path, reply } => {
                let result = self.list_directories(path).await;
                let _ = reply.send(result);
            }
            Op::LoginStart { server, reply } => {
                let result = self.login_start(server).await;
                let _ = reply.send(result);
            }
            Op::LoginCancel { server, reply } => {
                let result = self.login_cancel(server).await;
                let _ = reply.send(result);
            }
            Op::Logout { server, reply } => {
                let result = self.logout(server).await;
                let _ = reply.send(result);
            }
            Op::Notify {
                server,
                notification,
            } => {
                self.apply_notification(server, notification).await;
            }
            Op::Close { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
                return true;
            }
        }
        false
    }

    // ---- registry access -------------------------------------------------

    fn transport(&self, server: &ServerId) -> Result<Arc<dyn RpcTransport>, TetherError> {
        self.servers
            .get(server)
            .map(|entry| Arc::clone(&entry.transport))
            .ok_or_else(|| ConnectError::UnknownServer(server.clone()).into())
    }

    fn require_active_server(&self) -> Result<ServerId, TetherError> {
        self.active_server
            .clone()
            .ok_or_else(|| ConnectError::NoServer.into())
    }

    fn sorted_configs(&self) -> Vec<ServerConfig> {
        let mut configs: Vec<ServerConfig> =
            self.servers.values().map(|e| e.config.clone()).collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    /// Project and publish the current snapshot
    pub(super) fn commit(&self) {
        let state = AppState {
            connection_status: self.connection_status,
            connection_error: self.connection_error.clone(),
            active_server: self.active_server.clone(),
            active_thread: self.active_thread.clone(),
            servers: self.sorted_configs(),
            threads: self.threads.values().cloned().collect(),
            models: self.models.clone(),
            selected_model: self.selected_model.clone(),
            accounts: self.accounts.clone(),
        };
        self.store.commit(state);
    }

    fn persist_servers(&self) {
        if let Err(e) = self.server_store.save(&self.sorted_configs()) {
            tracing::warn!("Failed to persist saved servers: {}", e);
        }
    }

    // ---- connect lifecycle -----------------------------------------------

    async fn connect_local_default(&mut self) -> Result<ServerConfig, TetherError> {
        let port = match self.launcher.start().await {
            Ok(port) => port,
            Err(e) => {
                // Degrades to remote-only usability; record and surface
                self.connection_error = Some(e.to_string());
                return Err(e);
            }
        };

        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let mut config = ServerConfig::new(hostname, "127.0.0.1", port, DiscoverySource::Local);
        config.agent_server = true;
        self.connect(config).await
    }

    async fn connect(&mut self, config: ServerConfig) -> Result<ServerConfig, TetherError> {
        // Idempotent for an already-connected server id
        if let Some(entry) = self.servers.get(&config.id) {
            return Ok(entry.config.clone());
        }

        self.connection_status = ConnectionStatus::Connecting;
        self.commit();

        tracing::info!("Connecting to {} ({})", config.id, config.address());
        let connection = match self.connector.connect(&config).await {
            Ok(connection) => connection,
            Err(e) => {
                let message = e.to_string();
                self.connection_status = ConnectionStatus::Error;
                self.connection_error = Some(message.clone());
                return Err(ConnectError::Open {
                    endpoint: config.address().endpoint(),
                    message,
                }
                .into());
            }
        };

        let handshake = call::<InitializeResponse>(
            &*connection.transport,
            method::INITIALIZE,
            InitializeParams {
                client_name: CLIENT_NAME.to_string(),
                client_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )
        .await;
        if let Err(e) = handshake {
            connection.transport.close().await;
            let message = e.to_string();
            self.connection_status = ConnectionStatus::Error;
            self.connection_error = Some(message.clone());
            return Err(ConnectError::Handshake(message).into());
        }

        let notify_task =
            self.spawn_notification_pump(config.id.clone(), connection.notifications);
        self.servers.insert(
            config.id.clone(),
            ServerEntry {
                config: config.clone(),
                transport: connection.transport,
                notify_task,
            },
        );

        if self.active_server.is_none() {
            self.active_server = Some(config.id.clone());
        }
        self.connection_status = ConnectionStatus::Ready;
        self.connection_error = None;

        // Account state is part of the post-handshake picture; a failure
        // here lands on the account slice, not the connection
        self.read_account(&config.id).await;

        self.persist_servers();
        tracing::info!("Connected to {}", config.id);
        Ok(config)
    }

    fn spawn_notification_pump(
        &self,
        server: ServerId,
        mut notifications: mpsc::Receiver<Notification>,
    ) -> JoinHandle<()> {
        let ops = self.ops_tx.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let op = Op::Notify {
                    server: server.clone(),
                    notification,
                };
                if ops.send(op).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn reconnect_saved(&mut self) -> Result<Vec<ServerConfig>, TetherError> {
        let saved = self.server_store.load().map_err(TetherError::Config)?;
        let mut connected = Vec::new();

        for config in saved {
            let id = config.id.clone();
            // Each attempt is fault-isolated; one failure must not abort the rest
            match self.connect(config).await {
                Ok(config) => connected.push(config),
                Err(e) => {
                    tracing::warn!("Saved server {} did not reconnect: {}", id, e);
                }
            }
        }

        if !connected.is_empty() {
            self.connection_status = ConnectionStatus::Ready;
            self.connection_error = None;
        } else if self.servers.is_empty() {
            self.connection_status = ConnectionStatus::Disconnected;
        }
        Ok(connected)
    }

    async fn disconnect(&mut self, target: DisconnectTarget) -> Result<(), TetherError> {
        let ids: Vec<ServerId> = match &target {
            DisconnectTarget::Server(id) => vec![id.clone()],
            DisconnectTarget::All => self.servers.keys().cloned().collect(),
        };

        for id in &ids {
            let Some(entry) = self.servers.remove(id) else {
                continue;
            };
            tracing::info!("Disconnecting {}", id);
            entry.notify_task.abort();
            entry.transport.close().await;
            self.threads.retain(|key, _| &key.server != id);
            self.accounts.remove(id);
        }

        self.recompute_active_pointers();
        self.connection_status = if self.servers.is_empty() {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Ready
        };
        self.persist_servers();
        Ok(())
    }

    /// Deterministic fallback after evictions: keep a still-valid pointer,
    /// else the most-recently-updated remaining thread, else the first
    /// remaining server, else null.
    fn recompute_active_pointers(&mut self) {
        if let Some(key) = &self.active_thread {
            if self.threads.contains_key(key) {
                self.active_server = Some(key.server.clone());
                return;
            }
        }

        let newest = self
            .threads
            .values()
            .max_by(|a, b| {
                (a.updated_at, &a.key.thread_id).cmp(&(b.updated_at, &b.key.thread_id))
            })
            .map(|t| t.key.clone());
        if let Some(key) = newest {
            self.active_server = Some(key.server.clone());
            self.active_thread = Some(key);
            return;
        }

        self.active_thread = None;
        let valid = self
            .active_server
            .as_ref()
            .is_some_and(|id| self.servers.contains_key(id));
        if !valid {
            self.active_server = self.sorted_configs().first().map(|c| c.id.clone());
        }
    }

    async fn teardown(&mut self) {
        tracing::info!("Coordinator closing");
        for (_, entry) in self.servers.drain() {
            entry.notify_task.abort();
            entry.transport.close().await;
        }
        self.launcher.stop().await;
        self.threads.clear();
        self.accounts.clear();
        self.active_server = None;
        self.active_thread = None;
        self.connection_status = ConnectionStatus::Disconnected;
    }

    // ---- thread registry -------------------------------------------------

    async fn refresh_sessions(&mut self, server: Option<ServerId>) -> Result<(), TetherError> {
        let explicit = server.is_some();
        let targets: Vec<ServerId> = match server {
            Some(id) => {
                if !self.servers.contains_key(&id) {
                    return Err(ConnectError::UnknownServer(id).into());
                }
                vec![id]
            }
            None => self.sorted_configs().into_iter().map(|c| c.id).collect(),
        };

        for id in targets {
            let transport = self.transport(&id)?;
            let listed =
                call::<ThreadListResponse>(&*transport, method::THREAD_LIST, serde_json::json!({}))
                    .await;
            match listed {
                Ok(response) => self.merge_thread_list(&id, response.threads),
                Err(e) if explicit => return Err(e),
                Err(e) => tracing::warn!("Thread list from {} failed: {}", id, e),
            }
        }
        Ok(())
    }

    fn merge_thread_list(&mut self, server: &ServerId, summaries: Vec<ThreadSummary>) {
        let now = now_millis();
        for summary in summaries {
            let key = ThreadKey::new(server.clone(), &summary.id);
            match self.threads.get_mut(&key) {
                Some(existing) => {
                    existing.merge_summary(
                        summary.preview.as_deref(),
                        summary.cwd.as_deref(),
                        summary.updated_at,
                    );
                }
                None => {
                    let mut thread =
                        ThreadState::new(key.clone(), summary.updated_at.unwrap_or(now));
                    thread.preview = summary.preview.unwrap_or_default();
                    thread.cwd = summary.cwd;
                    self.threads.insert(key, thread);
                }
            }
        }
    }

    async fn load_models(&mut self, server: Option<ServerId>) -> Result<Vec<ModelInfo>, TetherError> {
        let id = match server {
            Some(id) => id,
            None => self.require_active_server()?,
        };
        let transport = self.transport(&id)?;
        let response =
            call::<ModelListResponse>(&*transport, method::MODEL_LIST, serde_json::json!({}))
                .await?;
        self.models = response.models;

        // Keep the current selection when still offered (the explicit
        // reasoning-effort override rides along); otherwise the server's
        // default, otherwise the first entry
        self.selected_model = match self.selected_model.take() {
            Some(current) if self.models.iter().any(|m| m.id == current.model) => Some(current),
            _ => self
                .models
                .iter()
                .find(|m| m.is_default)
                .or_else(|| self.models.first())
                .map(|m| ModelSelection::model(&m.id)),
        };

        Ok(self.models.clone())
    }

    /// Tiered sandbox policy shared by start and resume: the restrictive
    /// profile first, one retry with the permissive profile when the server
    /// reports the recognized unavailability signature, anything else is
    /// terminal.
    async fn with_sandbox_tiers<R, Fut>(
        &self,
        request: impl Fn(SandboxMode) -> Fut,
    ) -> Result<R, TetherError>
    where
        Fut: std::future::Future<Output = Result<R, TetherError>>,
    {
        match request(SandboxMode::WorkspaceWrite).await {
            Ok(response) => Ok(response),
            Err(TetherError::Protocol(ProtocolError::ServerError(message)))
                if is_sandbox_unavailable(&message) =>
            {
                tracing::warn!(
                    "Restrictive sandbox unavailable ({}), retrying with permissive profile",
                    message
                );
                request(SandboxMode::FullAccess).await
            }
            Err(e) => Err(e),
        }
    }

    async fn start_thread(
        &mut self,
        cwd: String,
        model: Option<ModelSelection>,
    ) -> Result<ThreadKey, TetherError> {
        let server = self.require_active_server()?;
        let transport = self.transport(&server)?;
        let selection = model.or_else(|| self.selected_model.clone());

        let response: ThreadStartResponse = self
            .with_sandbox_tiers(|sandbox| {
                let transport = Arc::clone(&transport);
                let cwd = cwd.clone();
                let selection = selection.clone();
                async move {
                    call(
                        &*transport,
                        method::THREAD_START,
                        ThreadStartParams {
                            cwd,
                            model: selection.as_ref().map(|s| s.model.clone()),
                            effort: selection.and_then(|s| s.effort),
                            sandbox,
                        },
                    )
                    .await
                }
            })
            .await
            .map_err(|e| match e {
                TetherError::Protocol(ProtocolError::ServerError(message)) => {
                    ThreadError::StartFailed(message).into()
                }
                other => other,
            })?;

        let key = ThreadKey::new(server.clone(), &response.thread_id);
        let mut thread = ThreadState::new(key.clone(), now_millis());
        thread.cwd = Some(cwd);
        self.threads.insert(key.clone(), thread);

        self.active_server = Some(server);
        self.active_thread = Some(key.clone());
        tracing::info!("Started thread {}", key);
        Ok(key)
    }

    async fn resume_thread(
        &mut self,
        server: ServerId,
        thread_id: String,
        cwd: String,
    ) -> Result<ThreadKey, TetherError> {
        let transport = self.transport(&server)?;
        let key = ThreadKey::new(server.clone(), &thread_id);

        let resumed: Result<ThreadResumeResponse, TetherError> = self
            .with_sandbox_tiers(|sandbox| {
                let transport = Arc::clone(&transport);
                let thread_id = thread_id.clone();
                let cwd = cwd.clone();
                async move {
                    call(
                        &*transport,
                        method::THREAD_RESUME,
                        ThreadResumeParams {
                            thread_id,
                            cwd,
                            sandbox,
                        },
                    )
                    .await
                }
            })
            .await;

        match resumed {
            Ok(response) => {
                let now = now_millis();
                let history = response.thread.unwrap_or_default();
                let messages = reconstruct_history(&history, now);

                let thread = self
                    .threads
                    .entry(key.clone())
                    .or_insert_with(|| ThreadState::new(key.clone(), now));
                thread.messages = messages;
                thread.status = ThreadStatus::Ready;
                thread.cwd = Some(cwd);
                thread.last_error = None;
                thread.touch(now);
                if let Some(last) = thread
                    .messages
                    .iter()
                    .rev()
                    .find(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
                {
                    thread.preview = last.text.lines().next().unwrap_or_default().to_string();
                }

                self.active_server = Some(server);
                self.active_thread = Some(key.clone());
                tracing::info!("Resumed thread {}", key);
                Ok(key)
            }
            Err(e) => {
                // Keep whatever history we already had; only mark the thread
                if let Some(thread) = self.threads.get_mut(&key) {
                    thread.status = ThreadStatus::Error;
                    thread.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn select_thread(
        &mut self,
        key: ThreadKey,
        cwd: Option<String>,
    ) -> Result<(), TetherError> {
        let Some(thread) = self.threads.get(&key) else {
            return Err(ThreadError::UnknownThread(key).into());
        };

        if thread.messages.is_empty() {
            // Lazy hydration: no cached messages means we never resumed it
            let cwd = cwd
                .or_else(|| thread.cwd.clone())
                .unwrap_or_else(|| ".".to_string());
            self.resume_thread(key.server.clone(), key.thread_id.clone(), cwd)
                .await?;
        } else {
            self.active_server = Some(key.server.clone());
            self.active_thread = Some(key);
        }
        Ok(())
    }

    // ---- turns -----------------------------------------------------------

    async fn send_message(
        &mut self,
        text: String,
        cwd: Option<String>,
        model: Option<ModelSelection>,
        image: Option<String>,
    ) -> Result<(), TetherError> {
        if self.active_thread.is_none() {
            let cwd = cwd.clone().unwrap_or_else(|| ".".to_string());
            self.start_thread(cwd, model).await?;
        }
        let key = self
            .active_thread
            .clone()
            .ok_or(ThreadError::NoActiveThread)?;

        let outgoing = OutgoingMessage::compose(&text, image);
        let now = now_millis();

        // Optimistic local echo, published before the network call
        if let Some(thread) = self.threads.get_mut(&key) {
            thread.push_message(ChatMessage::finalized(
                MessageRole::User,
                outgoing.text.clone(),
                now,
            ));
        }
        self.commit();

        let transport = self.transport(&key.server)?;
        let started = call::<TurnStartResponse>(
            &*transport,
            method::TURN_START,
            TurnStartParams {
                thread_id: key.thread_id.clone(),
                input: outgoing.input_items(),
            },
        )
        .await;

        let Some(thread) = self.threads.get_mut(&key) else {
            // Disconnected underneath us mid-call
            return Err(ThreadError::UnknownThread(key).into());
        };
        match started {
            Ok(response) => {
                thread.active_turn = Some(response.turn_id);
                thread.status = ThreadStatus::Thinking;
                thread.touch(now_millis());
                Ok(())
            }
            Err(e) => {
                thread.status = ThreadStatus::Error;
                thread.last_error = Some(e.to_string());
                thread.finalize_streaming();
                Err(e)
            }
        }
    }

    async fn interrupt(&mut self) -> Result<(), TetherError> {
        let key = self
            .active_thread
            .clone()
            .ok_or(ThreadError::NoActiveThread)?;
        let transport = self.transport(&key.server)?;
        let turn_id = self.threads.get(&key).and_then(|t| t.active_turn.clone());

        let result = call::<serde_json::Value>(
            &*transport,
            method::TURN_INTERRUPT,
            TurnInterruptParams {
                thread_id: key.thread_id.clone(),
                turn_id,
            },
        )
        .await;

        let Some(thread) = self.threads.get_mut(&key) else {
            return Err(ThreadError::UnknownThread(key).into());
        };
        match result {
            Ok(_) => {
                thread.status = ThreadStatus::Ready;
                thread.active_turn = None;
                thread.finalize_streaming();
                Ok(())
            }
            Err(e) => {
                thread.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // ---- remote command execution ----------------------------------------

    async fn exec(
        &self,
        server: &ServerId,
        command: Vec<String>,
    ) -> Result<CommandExecResponse, TetherError> {
        let transport = self.transport(server)?;
        call(
            &*transport,
            method::COMMAND_EXEC,
            CommandExecParams {
                command,
                cwd: None,
                timeout_ms: Some(10_000),
            },
        )
        .await
    }

    async fn resolve_home_directory(&mut self) -> Result<String, TetherError> {
        let server = self.require_active_server()?;
        let response = self
            .exec(
                &server,
                vec!["sh".to_string(), "-c".to_string(), "echo $HOME".to_string()],
            )
            .await?;
        if response.exit_code != 0 {
            return Err(ProtocolError::ServerError(response.stderr).into());
        }
        Ok(response.stdout.trim().to_string())
    }

    async fn list_directories(&mut self, path: String) -> Result<Vec<String>, TetherError> {
        let server = self.require_active_server()?;
        let response = self
            .exec(
                &server,
                vec!["ls".to_string(), "-1ap".to_string(), path],
            )
            .await?;
        if response.exit_code != 0 {
            return Err(ProtocolError::ServerError(response.stderr).into());
        }

        let mut names: Vec<String> = response
            .stdout
            .lines()
            .filter(|line| line.ends_with('/'))
            .filter(|line| *line != "./" && *line != "../")
            .map(|line| line.trim_end_matches('/').to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    // ---- accounts --------------------------------------------------------

    pub(super) async fn read_account(&mut self, server: &ServerId) {
        let Ok(transport) = self.transport(server) else {
            return;
        };
        let read =
            call::<AccountReadResponse>(&*transport, method::ACCOUNT_READ, serde_json::json!({}))
                .await;
        match read {
            Ok(response) => {
                self.accounts.insert(
                    server.clone(),
                    AccountState {
                        auth_method: response.auth_method,
                        email: response.email,
                        pending_login_url: None,
                        pending_login_id: None,
                        last_error: None,
                    },
                );
            }
            Err(e) => {
                tracing::warn!("Account read from {} failed: {}", server, e);
                self.accounts.entry(server.clone()).or_default().last_error =
                    Some(e.to_string());
            }
        }
    }

    async fn login_start(&mut self, server: ServerId) -> Result<String, TetherError> {
        let transport = self.transport(&server)?;
        let response = call::<LoginStartResponse>(
            &*transport,
            method::ACCOUNT_LOGIN_START,
            serde_json::json!({}),
        )
        .await?;

        let account = self.accounts.entry(server).or_default();
        account.pending_login_url = Some(response.auth_url.clone());
        account.pending_login_id = Some(response.login_id);
        account.last_error = None;
        Ok(response.auth_url)
    }

    async fn login_cancel(&mut self, server: ServerId) -> Result<(), TetherError> {
        let transport = self.transport(&server)?;
        let login_id = self
            .accounts
            .get(&server)
            .and_then(|a| a.pending_login_id.clone());
        call::<serde_json::Value>(
            &*transport,
            method::ACCOUNT_LOGIN_CANCEL,
            serde_json::json!({ "loginId": login_id }),
        )
        .await?;

        if let Some(account) = self.accounts.get_mut(&server) {
            account.pending_login_url = None;
            account.pending_login_id = None;
        }
        Ok(())
    }

    async fn logout(&mut self, server: ServerId) -> Result<(), TetherError> {
        let transport = self.transport(&server)?;
        call::<serde_json::Value>(&*transport, method::ACCOUNT_LOGOUT, serde_json::json!({}))
            .await?;
        self.read_account(&server).await;
        Ok(())
    }
}
