//! Transport abstraction
//!
//! A transport is one persistent, request/response-correlated channel to a
//! server, plus delivery of its push notifications. The coordinator only
//! sees these traits; the shipped implementation is newline-delimited
//! JSON-RPC over TCP in [`tcp`].

mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use tether_core::{ConnectError, ServerConfig, TetherError};
use tether_protocol::{Notification, ProtocolError};

pub use tcp::{TcpConnector, TcpJsonTransport};

/// Transport-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// The socket could not be opened
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The request could not be written or the connection dropped first
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with an error response
    #[error("{0}")]
    Rpc(String),

    /// No response arrived within the request timeout
    #[error("Request timed out")]
    Timeout,

    /// The transport has been closed
    #[error("Transport closed")]
    Closed,
}

impl From<TransportError> for TetherError {
    fn from(e: TransportError) -> Self {
        match e {
            // Error responses keep their server-provided message so callers
            // can match failure signatures
            TransportError::Rpc(message) => {
                TetherError::Protocol(ProtocolError::ServerError(message))
            }
            other => TetherError::Connect(ConnectError::Lost(other.to_string())),
        }
    }
}

/// Request/response channel to one server
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue one request and await its correlated response
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Tear the connection down; pending requests fail with `Closed`
    async fn close(&self);
}

/// An established connection: the transport plus its notification stream
pub struct Connection {
    pub transport: Arc<dyn RpcTransport>,
    pub notifications: mpsc::Receiver<Notification>,
}

/// Factory opening transports to servers
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Connection, TransportError>;
}

/// Issue a typed request: serialize params, validate the response against
/// the per-method schema
pub async fn call<R: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &'static str,
    params: impl Serialize + Send,
) -> Result<R, TetherError> {
    let params = serde_json::to_value(params).map_err(ProtocolError::Json)?;
    let result = transport.request(method, params).await?;
    serde_json::from_value(result)
        .map_err(|source| ProtocolError::InvalidResponse { method, source }.into())
}
