//! Typed request parameters and response schemas
//!
//! One params/response pair per recognized method. Responses are validated
//! here rather than read as loose JSON; older servers spell fields in
//! snake_case, so each struct carries the alias table for both spellings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Recognized request method names
pub mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const THREAD_LIST: &str = "thread/list";
    pub const THREAD_START: &str = "thread/start";
    pub const THREAD_RESUME: &str = "thread/resume";
    pub const MODEL_LIST: &str = "model/list";
    pub const ACCOUNT_READ: &str = "account/read";
    pub const ACCOUNT_LOGIN_START: &str = "account/login/start";
    pub const ACCOUNT_LOGIN_CANCEL: &str = "account/login/cancel";
    pub const ACCOUNT_LOGOUT: &str = "account/logout";
    pub const TURN_START: &str = "turn/start";
    pub const TURN_INTERRUPT: &str = "turn/interrupt";
    pub const COMMAND_EXEC: &str = "command/exec";
}

/// Error-message signature a server emits when the restrictive sandbox
/// profile cannot be provided on its platform
const SANDBOX_UNAVAILABLE_SIGNATURE: &str = "sandbox unavailable";

/// Whether a failure message matches the recognized "sandbox unavailable"
/// signature that permits one retry with the permissive profile
pub fn is_sandbox_unavailable(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .contains(SANDBOX_UNAVAILABLE_SIGNATURE)
}

/// Execution-permission profile requested when starting or resuming a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// Restrictive profile: writes confined to the working directory
    WorkspaceWrite,
    /// Permissive fallback when the restrictive profile is unavailable
    FullAccess,
}

/// Handshake parameters sent as the first request on a new transport
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub client_name: String,
    pub client_version: String,
}

/// Handshake response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(default, alias = "user_agent")]
    pub user_agent: Option<String>,
}

/// One remote thread as reported by `thread/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    #[serde(alias = "thread_id", alias = "threadId")]
    pub id: String,
    #[serde(default, alias = "title")]
    pub preview: Option<String>,
    #[serde(default, alias = "working_directory", alias = "workingDirectory")]
    pub cwd: Option<String>,
    /// Unix milliseconds of the last server-side update
    #[serde(default, alias = "updated_at", alias = "timestamp")]
    pub updated_at: Option<i64>,
}

/// Response to `thread/list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadListResponse {
    #[serde(default, alias = "items", alias = "sessions")]
    pub threads: Vec<ThreadSummary>,
}

/// Parameters for `thread/start`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartParams {
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    pub sandbox: SandboxMode,
}

/// Response to `thread/start`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartResponse {
    #[serde(alias = "thread_id", alias = "id")]
    pub thread_id: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Parameters for `thread/resume`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResumeParams {
    pub thread_id: String,
    pub cwd: String,
    pub sandbox: SandboxMode,
}

/// One turn of a resumed thread's history; items are left untyped here and
/// mapped to [`crate::ThreadItem`] by the caller so unknown types can be
/// dropped without failing the whole payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRecord {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Turn/item history of a resumed thread. Modern servers nest items under
/// turns; legacy servers send one flat item array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadHistory {
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Response to `thread/resume`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResumeResponse {
    #[serde(default, alias = "history")]
    pub thread: Option<ThreadHistory>,
}

/// One model as reported by `model/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, alias = "display_name", alias = "displayName")]
    pub name: Option<String>,
    /// Server-flagged default selection
    #[serde(default, alias = "is_default", alias = "default")]
    pub is_default: bool,
}

/// Response to `model/list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelListResponse {
    #[serde(default, alias = "items")]
    pub models: Vec<ModelInfo>,
}

/// Authentication method of the account on a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    #[default]
    NotLoggedIn,
    Oauth,
    ApiKey,
    Unknown,
}

impl AuthMethod {
    fn as_wire(self) -> &'static str {
        match self {
            AuthMethod::NotLoggedIn => "not-logged-in",
            AuthMethod::Oauth => "oauth",
            AuthMethod::ApiKey => "api-key",
            AuthMethod::Unknown => "unknown",
        }
    }
}

impl Serialize for AuthMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

// Manual alias table: servers have spelled these values several ways over
// time, and an unrecognized method must degrade to Unknown, not fail parsing.
impl<'de> Deserialize<'de> for AuthMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "not-logged-in" | "not_logged_in" | "none" => AuthMethod::NotLoggedIn,
            "oauth" | "chatgpt" => AuthMethod::Oauth,
            "api-key" | "api_key" | "apikey" => AuthMethod::ApiKey,
            _ => AuthMethod::Unknown,
        })
    }
}

/// Response to `account/read`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReadResponse {
    #[serde(default, alias = "auth_method", alias = "authMode")]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

/// Response to `account/login/start`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStartResponse {
    #[serde(alias = "login_id", alias = "id")]
    pub login_id: String,
    #[serde(alias = "auth_url", alias = "url")]
    pub auth_url: String,
}

/// One element of a turn's structured input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputItem {
    Text { text: String },
    LocalImage { path: String },
}

/// Parameters for `turn/start`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartParams {
    pub thread_id: String,
    pub input: Vec<InputItem>,
}

/// Response to `turn/start`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartResponse {
    #[serde(alias = "turn_id", alias = "id")]
    pub turn_id: String,
}

/// Parameters for `turn/interrupt`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInterruptParams {
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

/// Parameters for `command/exec`. The command is an argv vector; no shell
/// quoting happens on the client side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecParams {
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Response to `command/exec`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecResponse {
    #[serde(default, alias = "exit_code")]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}
