//! JSON-RPC over TCP
//!
//! One JSON object per line. Requests carry an id; the read loop correlates
//! responses back to their waiting callers and forwards id-less messages as
//! notifications. Unrecognized notification methods are logged and dropped
//! so a newer server never wedges the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use tether_core::ServerConfig;
use tether_protocol::{Notification, ServerAddress};

use super::{Connection, Connector, RpcTransport, TransportError};

/// Longest accepted line; a turn's aggregated output can get large
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<DashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>;

/// Persistent JSON-line transport over TCP
pub struct TcpJsonTransport {
    endpoint: String,
    next_id: AtomicU64,
    pending: Pending,
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl TcpJsonTransport {
    /// Open a connection and start the read loop. Returns the transport and
    /// the stream of parsed notifications.
    pub async fn connect(
        address: &ServerAddress,
        request_timeout: Duration,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Notification>), TransportError> {
        let endpoint = address.endpoint();
        let stream = TcpStream::connect(&endpoint)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", endpoint, e)))?;

        let (read_half, write_half) = stream.into_split();
        let codec = || LinesCodec::new_with_max_length(MAX_LINE_BYTES);

        let pending: Pending = Arc::new(DashMap::new());
        let (notif_tx, notif_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        let transport = Arc::new(Self {
            endpoint: endpoint.clone(),
            next_id: AtomicU64::new(1),
            pending: Arc::clone(&pending),
            writer: Mutex::new(FramedWrite::new(write_half, codec())),
            cancel: cancel.clone(),
            request_timeout,
        });

        tokio::spawn(read_loop(
            endpoint,
            FramedRead::new(read_half, codec()),
            pending,
            notif_tx,
            cancel,
        ));

        Ok((transport, notif_rx))
    }
}

#[async_trait]
impl RpcTransport for TcpJsonTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(frame).await {
                self.pending.remove(&id);
                return Err(TransportError::Request(format!(
                    "write to {} failed: {}",
                    self.endpoint, e
                )));
            }
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Read loop died with the response outstanding
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
        fail_pending(&self.pending);
    }
}

impl Drop for TcpJsonTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Read loop: correlate responses, forward notifications, fail everything on
/// disconnect
async fn read_loop(
    endpoint: String,
    mut reader: FramedRead<OwnedReadHalf, LinesCodec>,
    pending: Pending,
    notif_tx: mpsc::Sender<Notification>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Transport to {} cancelled", endpoint);
                break;
            }
            frame = reader.next() => {
                match frame {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(&line) {
                            Ok(message) => dispatch(&endpoint, message, &pending, &notif_tx).await,
                            Err(e) => {
                                tracing::warn!("Undecodable frame from {}: {}", endpoint, e);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Read error from {}: {}", endpoint, e);
                        break;
                    }
                    None => {
                        tracing::info!("Server {} disconnected", endpoint);
                        break;
                    }
                }
            }
        }
    }
    fail_pending(&pending);
}

async fn dispatch(
    endpoint: &str,
    message: Value,
    pending: &Pending,
    notif_tx: &mpsc::Sender<Notification>,
) {
    // Responses carry the id of the request they answer
    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let result = if let Some(error) = message.get("error") {
            let text = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified server error");
            Err(TransportError::Rpc(text.to_string()))
        } else {
            Ok(message.get("result").cloned().unwrap_or(Value::Null))
        };

        match pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => tracing::debug!("Response for unknown request id {} from {}", id, endpoint),
        }
        return;
    }

    // Id-less messages are notifications
    let Some(method) = message.get("method").and_then(Value::as_str) else {
        tracing::warn!("Frame from {} is neither response nor notification", endpoint);
        return;
    };
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    match Notification::parse(method, &params) {
        Ok(Some(notification)) => {
            if notif_tx.send(notification).await.is_err() {
                tracing::debug!("Notification receiver for {} dropped", endpoint);
            }
        }
        Ok(None) => tracing::trace!("Ignoring unrecognized notification {}", method),
        Err(e) => tracing::warn!("Bad notification from {}: {}", endpoint, e),
    }
}

fn fail_pending(pending: &Pending) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }
}

/// Connector producing [`TcpJsonTransport`] connections
#[derive(Debug, Clone)]
pub struct TcpConnector {
    request_timeout: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Connection, TransportError> {
        let (transport, notifications) =
            TcpJsonTransport::connect(&config.address(), self.request_timeout).await?;
        Ok(Connection {
            transport,
            notifications,
        })
    }
}
