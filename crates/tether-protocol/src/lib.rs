//! tether-protocol: Wire protocol for Tether agent-server sessions
//!
//! This crate defines the request/response and notification surface spoken
//! between a Tether client and an agent-execution server over one persistent
//! socket. Payloads are JSON; every response is validated into a typed
//! per-method schema at the parse boundary, with an explicit alias table for
//! the camelCase/snake_case field spellings seen from older servers.

pub mod address;
pub mod error;
pub mod items;
pub mod notification;
pub mod request;

pub use address::ServerAddress;
pub use error::ProtocolError;
pub use items::{combine_user_content, CommandField, ContentPart, FileUpdate, PlanStep, ThreadItem};
pub use notification::{notify_method, Notification};
pub use request::{
    method, is_sandbox_unavailable, AccountReadResponse, AuthMethod, CommandExecParams,
    CommandExecResponse, InitializeParams, InitializeResponse, InputItem, LoginStartResponse,
    ModelInfo, ModelListResponse, SandboxMode, ThreadHistory, ThreadListResponse,
    ThreadResumeParams, ThreadResumeResponse, ThreadStartParams, ThreadStartResponse,
    ThreadSummary, TurnInterruptParams, TurnRecord, TurnStartParams, TurnStartResponse,
};
