//! Server-to-client notifications
//!
//! Notifications arrive as method-tagged JSON with no request id. Dispatch is
//! by method name; parameters are validated into typed structs with the same
//! alias tolerance as the request schemas. Unknown methods parse to `None` so
//! a newer server never breaks an older client.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Recognized notification method names
pub mod notify_method {
    pub const LOGIN_COMPLETED: &str = "account/login/completed";
    pub const ACCOUNT_UPDATED: &str = "account/updated";
    pub const TURN_STARTED: &str = "turn/started";
    pub const AGENT_MESSAGE_DELTA: &str = "item/agentMessage/delta";
    pub const ITEM_COMPLETED: &str = "item/completed";
    pub const TURN_COMPLETED: &str = "turn/completed";
    /// Legacy spelling still emitted by older servers
    pub const TURN_COMPLETED_LEGACY: &str = "turn/complete";
}

/// A parsed notification
#[derive(Debug, Clone)]
pub enum Notification {
    /// An interactive login attempt finished
    LoginCompleted {
        login_id: Option<String>,
        success: bool,
        error: Option<String>,
    },
    /// Account state changed server-side; re-read it
    AccountUpdated,
    /// A turn began executing
    TurnStarted {
        thread_id: String,
        turn_id: Option<String>,
    },
    /// Streaming fragment of the assistant's message
    AgentMessageDelta {
        thread_id: Option<String>,
        delta: String,
    },
    /// A structured item finished
    ItemCompleted {
        thread_id: Option<String>,
        item: Value,
    },
    /// A turn finished; a missing thread id means the server did not say which
    TurnCompleted {
        thread_id: Option<String>,
        turn_id: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginCompletedParams {
    #[serde(default, alias = "login_id", alias = "id")]
    login_id: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnStartedParams {
    #[serde(alias = "thread_id")]
    thread_id: String,
    #[serde(default, alias = "turn_id", alias = "id")]
    turn_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaParams {
    #[serde(default, alias = "thread_id")]
    thread_id: Option<String>,
    delta: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemCompletedParams {
    #[serde(default, alias = "thread_id")]
    thread_id: Option<String>,
    item: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnCompletedParams {
    #[serde(default, alias = "thread_id")]
    thread_id: Option<String>,
    #[serde(default, alias = "turn_id")]
    turn_id: Option<String>,
}

impl Notification {
    /// Parse a notification by method name. Returns `Ok(None)` for methods
    /// this client does not recognize.
    pub fn parse(method: &str, params: &Value) -> Result<Option<Self>, ProtocolError> {
        let invalid = |source| ProtocolError::InvalidNotification {
            method: method.to_string(),
            source,
        };

        let parsed = match method {
            notify_method::LOGIN_COMPLETED => {
                let p: LoginCompletedParams =
                    serde_json::from_value(params.clone()).map_err(invalid)?;
                // Absent success flag: treat an error-free completion as success
                let success = p.success.unwrap_or(p.error.is_none());
                Notification::LoginCompleted {
                    login_id: p.login_id,
                    success,
                    error: p.error,
                }
            }
            notify_method::ACCOUNT_UPDATED => Notification::AccountUpdated,
            notify_method::TURN_STARTED => {
                let p: TurnStartedParams =
                    serde_json::from_value(params.clone()).map_err(invalid)?;
                Notification::TurnStarted {
                    thread_id: p.thread_id,
                    turn_id: p.turn_id,
                }
            }
            notify_method::AGENT_MESSAGE_DELTA => {
                let p: DeltaParams = serde_json::from_value(params.clone()).map_err(invalid)?;
                Notification::AgentMessageDelta {
                    thread_id: p.thread_id,
                    delta: p.delta,
                }
            }
            notify_method::ITEM_COMPLETED => {
                let p: ItemCompletedParams =
                    serde_json::from_value(params.clone()).map_err(invalid)?;
                Notification::ItemCompleted {
                    thread_id: p.thread_id,
                    item: p.item,
                }
            }
            notify_method::TURN_COMPLETED | notify_method::TURN_COMPLETED_LEGACY => {
                let p: TurnCompletedParams =
                    serde_json::from_value(params.clone()).map_err(invalid)?;
                Notification::TurnCompleted {
                    thread_id: p.thread_id,
                    turn_id: p.turn_id,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(parsed))
    }
}
