//! Core error types for Tether
//!
//! The taxonomy mirrors where a failure lands in state: connect-time
//! failures degrade the global connection slice, thread-scoped failures mark
//! only the affected thread, and config/protocol failures stay with the
//! operation that raised them. Nothing here is ever thrown across the state
//! boundary; the coordinator records errors onto the relevant slice.

use std::path::PathBuf;

use thiserror::Error;

use tether_protocol::ProtocolError;

use crate::types::{ServerId, ThreadKey};

/// Top-level error type for the Tether client
#[derive(Error, Debug)]
pub enum TetherError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Thread-scoped error
    #[error("Thread error: {0}")]
    Thread(#[from] ThreadError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local runtime could not be started
    #[error("Runtime launcher error: {0}")]
    Launcher(String),

    /// The coordinator has been closed and no longer accepts operations
    #[error("Coordinator is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The socket could not be opened
    #[error("Connection failed to {endpoint}: {message}")]
    Open { endpoint: String, message: String },

    /// The initialize handshake was rejected
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The transport dropped mid-operation
    #[error("Connection lost: {0}")]
    Lost(String),

    /// No connected server under this id
    #[error("Unknown server: {0}")]
    UnknownServer(ServerId),

    /// No server is connected at all
    #[error("No server connected")]
    NoServer,
}

/// Thread- and turn-scoped errors, isolated from other threads
#[derive(Error, Debug)]
pub enum ThreadError {
    /// No registered thread under this key
    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadKey),

    /// No thread is active to receive the operation
    #[error("No active thread")]
    NoActiveThread,

    /// The server rejected a thread start/resume
    #[error("Thread start failed: {0}")]
    StartFailed(String),

    /// A turn request failed
    #[error("Turn failed: {0}")]
    TurnFailed(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
