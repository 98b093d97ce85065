//! End-to-end coordinator tests against a scripted in-memory transport

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use tether_client::{
    Connection, ConnectionCoordinator, Connector, DisconnectTarget, RpcTransport, RuntimeLauncher,
    RuntimeStatus, StateStore, TransportError,
};
use tether_core::{
    config::ServerStore, AppState, ConnectionStatus, DiscoverySource, MessageRole, ServerConfig,
    TetherError, ThreadStatus,
};
use tether_protocol::Notification;

/// Transport whose responses are scripted per method. Unscripted methods
/// answer `{}`; scripted ones pop replies in order.
struct MockTransport {
    responses: Mutex<HashMap<String, Vec<Result<Value, TransportError>>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    async fn script(&self, method: &str, replies: Vec<Result<Value, TransportError>>) {
        self.responses
            .lock()
            .await
            .insert(method.to_string(), replies);
    }

    async fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.requests
            .lock()
            .await
            .push((method.to_string(), params));
        let mut responses = self.responses.lock().await;
        match responses.get_mut(method) {
            Some(replies) if !replies.is_empty() => replies.remove(0),
            _ => Ok(json!({})),
        }
    }

    async fn close(&self) {}
}

/// Connector handing out pre-registered transports by host, with a captured
/// notification sender per server so tests can push server events
#[derive(Default)]
struct MockConnector {
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    notifiers: Mutex<HashMap<String, mpsc::Sender<Notification>>>,
    refused: Mutex<Vec<String>>,
}

impl MockConnector {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn register(&self, host: &str) -> Arc<MockTransport> {
        let transport = MockTransport::new();
        self.transports
            .lock()
            .await
            .insert(host.to_string(), Arc::clone(&transport));
        transport
    }

    async fn refuse(&self, host: &str) {
        self.refused.lock().await.push(host.to_string());
    }

    async fn notifier(&self, host: &str) -> mpsc::Sender<Notification> {
        self.notifiers.lock().await.get(host).unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Connection, TransportError> {
        if self.refused.lock().await.contains(&config.host) {
            return Err(TransportError::Connect(format!(
                "{} refused",
                config.host
            )));
        }
        let transport = {
            let mut transports = self.transports.lock().await;
            transports
                .entry(config.host.clone())
                .or_insert_with(MockTransport::new);
            Arc::clone(transports.get(&config.host).unwrap())
        };
        let (tx, rx) = mpsc::channel(64);
        self.notifiers.lock().await.insert(config.host.clone(), tx);
        Ok(Connection {
            transport,
            notifications: rx,
        })
    }
}

struct MockLauncher {
    port: u16,
}

#[async_trait]
impl RuntimeLauncher for MockLauncher {
    async fn start(&self) -> Result<u16, TetherError> {
        Ok(self.port)
    }

    async fn stop(&self) {}

    async fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            running: true,
            ready: true,
            port: Some(self.port),
            last_error: None,
        }
    }
}

fn test_config(host: &str) -> ServerConfig {
    ServerConfig::new(host, host, 4747, DiscoverySource::Manual)
}

fn spawn_coordinator(
    connector: Arc<MockConnector>,
    dir: &tempfile::TempDir,
) -> ConnectionCoordinator {
    ConnectionCoordinator::spawn(
        connector,
        Arc::new(MockLauncher { port: 4747 }),
        ServerStore::at(dir.path().join("servers.toml")),
    )
}

/// Await a snapshot satisfying the predicate; panics after two seconds
async fn wait_for(store: &StateStore, predicate: impl Fn(&AppState) -> bool) -> Arc<AppState> {
    let mut rx = store.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let snapshot = store.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero()
            || tokio::time::timeout(remaining, rx.changed()).await.is_err()
        {
            panic!("timed out waiting for state condition");
        }
    }
}

#[tokio::test]
async fn test_connect_local_default_fresh_coordinator() {
    let connector = MockConnector::new();
    connector.register("127.0.0.1").await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let config = coordinator.connect_local_default().await.unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.source, DiscoverySource::Local);

    let state = coordinator.snapshot();
    assert_eq!(state.connection_status, ConnectionStatus::Ready);
    assert_eq!(state.servers.len(), 1);
    assert_eq!(state.servers[0].source, DiscoverySource::Local);
    assert!(state.threads.is_empty());
    assert_eq!(state.active_server, Some(config.id));
}

#[tokio::test]
async fn test_connect_is_idempotent_per_server_id() {
    let connector = MockConnector::new();
    connector.register("10.0.0.5").await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let first = coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    let second = coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(coordinator.snapshot().servers.len(), 1);
}

#[tokio::test]
async fn test_active_server_always_valid_across_connect_disconnect() {
    let connector = MockConnector::new();
    connector.register("10.0.0.1").await;
    connector.register("10.0.0.2").await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let a = coordinator.connect(test_config("10.0.0.1")).await.unwrap();
    let b = coordinator.connect(test_config("10.0.0.2")).await.unwrap();

    let check = |state: &AppState| match &state.active_server {
        Some(id) => state.servers.iter().any(|s| &s.id == id),
        None => true,
    };

    assert!(check(&coordinator.snapshot()));
    coordinator
        .disconnect(DisconnectTarget::Server(a.id.clone()))
        .await
        .unwrap();
    let state = coordinator.snapshot();
    assert!(check(&state));
    assert_eq!(state.active_server, Some(b.id.clone()));

    coordinator
        .disconnect(DisconnectTarget::Server(b.id))
        .await
        .unwrap();
    let state = coordinator.snapshot();
    assert!(check(&state));
    assert_eq!(state.active_server, None);
    assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_send_message_with_no_active_thread_creates_one() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script("turn/start", vec![Ok(json!({"turnId": "u-1"}))])
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .send_message("hello there".to_string(), Some("/work".to_string()), None, None)
        .await
        .unwrap();

    let state = coordinator.snapshot();
    assert_eq!(state.threads.len(), 1);
    let thread = &state.threads[0];
    assert_eq!(thread.key.thread_id, "t-1");
    assert_eq!(state.active_thread.as_ref(), Some(&thread.key));
    // The new thread contains exactly the sent message
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.messages[0].role, MessageRole::User);
    assert_eq!(thread.messages[0].text, "hello there");
    assert_eq!(thread.status, ThreadStatus::Thinking);
    assert_eq!(thread.active_turn.as_deref(), Some("u-1"));
}

#[tokio::test]
async fn test_deltas_stream_into_single_message_and_finalize() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script("turn/start", vec![Ok(json!({"turnId": "u-1"}))])
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .send_message("question".to_string(), Some("/w".to_string()), None, None)
        .await
        .unwrap();

    let notifier = connector.notifier("10.0.0.5").await;
    for delta in ["Hel", "", "lo ", "world"] {
        notifier
            .send(Notification::AgentMessageDelta {
                thread_id: Some("t-1".to_string()),
                delta: delta.to_string(),
            })
            .await
            .unwrap();
    }

    let state = wait_for(coordinator.store(), |s| {
        s.threads
            .first()
            .map(|t| t.messages.len() == 2 && t.messages[1].text == "Hello world")
            .unwrap_or(false)
    })
    .await;
    assert!(state.threads[0].messages[1].streaming);

    // Finalize twice; the second completion must be a no-op
    for _ in 0..2 {
        notifier
            .send(Notification::TurnCompleted {
                thread_id: Some("t-1".to_string()),
                turn_id: Some("u-1".to_string()),
            })
            .await
            .unwrap();
    }

    let state = wait_for(coordinator.store(), |s| {
        s.threads
            .first()
            .map(|t| t.status == ThreadStatus::Ready)
            .unwrap_or(false)
    })
    .await;
    let thread = &state.threads[0];
    assert_eq!(thread.messages.len(), 2);
    assert!(!thread.messages[1].streaming);
    assert!(thread.active_turn.is_none());
}

#[tokio::test]
async fn test_turn_completed_without_thread_id_finalizes_active_turns() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script("turn/start", vec![Ok(json!({"turnId": "u-1"}))])
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .send_message("go".to_string(), Some("/w".to_string()), None, None)
        .await
        .unwrap();

    connector
        .notifier("10.0.0.5")
        .await
        .send(Notification::TurnCompleted {
            thread_id: None,
            turn_id: None,
        })
        .await
        .unwrap();

    let state = wait_for(coordinator.store(), |s| {
        s.threads
            .first()
            .map(|t| t.status == ThreadStatus::Ready && t.active_turn.is_none())
            .unwrap_or(false)
    })
    .await;
    assert_eq!(state.threads.len(), 1);
}

#[tokio::test]
async fn test_refresh_sessions_monotonic_merge() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script(
            "thread/list",
            vec![
                Ok(json!({"threads": [
                    {"id": "t-1", "preview": "first", "workingDirectory": "/a", "updatedAt": 1000}
                ]})),
                Ok(json!({"threads": [
                    {"id": "t-1", "preview": "stale", "updatedAt": 500}
                ]})),
            ],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let config = coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .refresh_sessions(Some(config.id.clone()))
        .await
        .unwrap();

    let state = coordinator.snapshot();
    assert_eq!(state.threads[0].updated_at, 1000);
    assert_eq!(state.threads[0].preview, "first");

    // A second listing with an older timestamp must not move updatedAt back
    coordinator
        .refresh_sessions(Some(config.id))
        .await
        .unwrap();
    let state = coordinator.snapshot();
    assert_eq!(state.threads[0].updated_at, 1000);
    assert_eq!(state.threads[0].preview, "stale");
}

#[tokio::test]
async fn test_sandbox_fallback_retries_once_with_permissive_profile() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script(
            "thread/start",
            vec![
                Err(TransportError::Rpc(
                    "sandbox unavailable on this platform".to_string(),
                )),
                Ok(json!({"threadId": "t-1"})),
            ],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    let key = coordinator
        .start_thread("/w".to_string(), None)
        .await
        .unwrap();
    assert_eq!(key.thread_id, "t-1");

    let starts = transport.requests_for("thread/start").await;
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[0]["sandbox"], "workspace-write");
    assert_eq!(starts[1]["sandbox"], "full-access");
}

#[tokio::test]
async fn test_non_sandbox_failure_does_not_retry() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script(
            "thread/start",
            vec![Err(TransportError::Rpc("quota exceeded".to_string()))],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    let err = coordinator
        .start_thread("/w".to_string(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(transport.requests_for("thread/start").await.len(), 1);
}

#[tokio::test]
async fn test_reconnect_saved_isolates_failures() {
    let connector = MockConnector::new();
    connector.register("10.0.0.1").await;
    connector.refuse("10.0.0.2").await;
    let dir = tempfile::tempdir().unwrap();

    // Seed the saved list directly
    let store = ServerStore::at(dir.path().join("servers.toml"));
    store
        .save(&[test_config("10.0.0.1"), test_config("10.0.0.2")])
        .unwrap();

    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);
    let connected = coordinator.reconnect_saved().await.unwrap();

    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].host, "10.0.0.1");
    let state = coordinator.snapshot();
    assert_eq!(state.connection_status, ConnectionStatus::Ready);
    assert_eq!(state.servers.len(), 1);
}

#[tokio::test]
async fn test_send_failure_marks_thread_only() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script(
            "turn/start",
            vec![Err(TransportError::Rpc("model overloaded".to_string()))],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    let err = coordinator
        .send_message("hi".to_string(), Some("/w".to_string()), None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("model overloaded"));

    let state = coordinator.snapshot();
    // Thread-scoped failure: the global connection stays ready
    assert_eq!(state.connection_status, ConnectionStatus::Ready);
    let thread = &state.threads[0];
    assert_eq!(thread.status, ThreadStatus::Error);
    assert!(thread.last_error.as_deref().unwrap().contains("model overloaded"));
    // The optimistic user message survives the failure
    assert_eq!(thread.messages.len(), 1);
}

#[tokio::test]
async fn test_disconnect_falls_back_to_most_recent_thread() {
    let connector = MockConnector::new();
    let t1 = connector.register("10.0.0.1").await;
    connector.register("10.0.0.2").await;
    t1.script(
        "thread/list",
        vec![Ok(json!({"threads": [
            {"id": "old", "updatedAt": 100},
            {"id": "new", "updatedAt": 900}
        ]}))],
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let a = coordinator.connect(test_config("10.0.0.1")).await.unwrap();
    let b = coordinator.connect(test_config("10.0.0.2")).await.unwrap();
    coordinator.refresh_sessions(Some(a.id)).await.unwrap();

    // Select nothing explicitly; drop server b and the pointer must land on
    // server a's most recent thread
    coordinator
        .disconnect(DisconnectTarget::Server(b.id))
        .await
        .unwrap();

    let state = coordinator.snapshot();
    let active = state.active_thread.as_ref().expect("active thread");
    assert_eq!(active.thread_id, "new");
    assert_eq!(state.active_server.as_ref(), Some(&active.server));
}

#[tokio::test]
async fn test_select_thread_with_cached_messages_is_pointer_switch() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script("turn/start", vec![Ok(json!({"turnId": "u-1"}))])
        .await;
    transport
        .script(
            "thread/list",
            vec![Ok(json!({"threads": [{"id": "t-2", "updatedAt": 50}]}))],
        )
        .await;
    transport
        .script(
            "thread/resume",
            vec![Ok(json!({"thread": {"turns": [{"items": [
                {"type": "userMessage", "text": "earlier question"},
                {"type": "agentMessage", "text": "earlier answer"}
            ]}]}}))],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    let config = coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .send_message("hi".to_string(), Some("/w".to_string()), None, None)
        .await
        .unwrap();
    coordinator
        .refresh_sessions(Some(config.id.clone()))
        .await
        .unwrap();

    // t-2 has no cached messages: selecting it triggers a lazy resume
    let t2 = tether_core::ThreadKey::new(config.id.clone(), "t-2");
    coordinator
        .select_thread(t2.clone(), Some("/w".to_string()))
        .await
        .unwrap();
    let state = coordinator.snapshot();
    assert_eq!(state.active_thread.as_ref(), Some(&t2));
    let thread = state.thread(&t2).unwrap();
    assert_eq!(thread.messages.len(), 2);
    assert_eq!(thread.messages[0].text, "earlier question");
    assert_eq!(transport.requests_for("thread/resume").await.len(), 1);

    // t-1 has cached messages: switching back is a pure pointer move
    let t1 = tether_core::ThreadKey::new(config.id, "t-1");
    coordinator
        .select_thread(t1.clone(), None)
        .await
        .unwrap();
    assert_eq!(coordinator.snapshot().active_thread.as_ref(), Some(&t1));
    assert_eq!(transport.requests_for("thread/resume").await.len(), 1);
}

#[tokio::test]
async fn test_image_marker_extraction_and_priority() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script("thread/start", vec![Ok(json!({"threadId": "t-1"}))])
        .await;
    transport
        .script(
            "turn/start",
            vec![
                Ok(json!({"turnId": "u-1"})),
                Ok(json!({"turnId": "u-2"})),
            ],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator
        .send_message(
            "see [image:/tmp/shot.png] here".to_string(),
            Some("/w".to_string()),
            None,
            None,
        )
        .await
        .unwrap();

    let turns = transport.requests_for("turn/start").await;
    assert_eq!(turns[0]["input"][0]["text"], "see here");
    assert_eq!(turns[0]["input"][1]["type"], "localImage");
    assert_eq!(turns[0]["input"][1]["path"], "/tmp/shot.png");

    // An explicit attachment wins over the embedded marker
    coordinator
        .send_message(
            "with [image:/tmp/embedded.png]".to_string(),
            None,
            None,
            Some("/tmp/explicit.png".to_string()),
        )
        .await
        .unwrap();
    let turns = transport.requests_for("turn/start").await;
    assert_eq!(turns[1]["input"][1]["path"], "/tmp/explicit.png");
}

#[tokio::test]
async fn test_list_directories_filters_and_sorts() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script(
            "command/exec",
            vec![Ok(json!({
                "exitCode": 0,
                "stdout": "./\n../\nzeta/\nnotes.txt\nalpha/\n.config/\n",
                "stderr": ""
            }))],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    let dirs = coordinator
        .list_directories("/home/user".to_string())
        .await
        .unwrap();
    assert_eq!(dirs, vec![".config", "alpha", "zeta"]);
}

#[tokio::test]
async fn test_load_models_selection_rules() {
    let connector = MockConnector::new();
    let transport = connector.register("10.0.0.5").await;
    transport
        .script(
            "model/list",
            vec![
                Ok(json!({"models": [
                    {"id": "small"},
                    {"id": "large", "isDefault": true}
                ]})),
                Ok(json!({"models": [
                    {"id": "small"},
                    {"id": "large", "isDefault": true},
                    {"id": "huge"}
                ]})),
            ],
        )
        .await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator.load_models(None).await.unwrap();
    let state = coordinator.snapshot();
    assert_eq!(state.selected_model.as_ref().unwrap().model, "large");

    // The server-flagged default stays selected across a reload
    coordinator.load_models(None).await.unwrap();
    let state = coordinator.snapshot();
    assert_eq!(state.selected_model.as_ref().unwrap().model, "large");
}

#[tokio::test]
async fn test_close_rejects_further_operations() {
    let connector = MockConnector::new();
    connector.register("10.0.0.5").await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = spawn_coordinator(Arc::clone(&connector), &dir);

    coordinator.connect(test_config("10.0.0.5")).await.unwrap();
    coordinator.close().await.unwrap();

    let err = coordinator
        .connect(test_config("10.0.0.5"))
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Closed));
}
