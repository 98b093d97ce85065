//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding protocol payloads
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A response payload did not match the expected per-method schema
    #[error("Invalid response for {method}: {source}")]
    InvalidResponse {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Notification parameters did not match the expected schema
    #[error("Invalid parameters for notification {method}: {source}")]
    InvalidNotification {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server returned an error response to a request
    #[error("Server error: {0}")]
    ServerError(String),

    /// JSON encoding/decoding failure outside a typed schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
