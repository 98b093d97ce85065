//! tether-core: Core domain types and configuration for Tether
//!
//! Domain identities, the UI-facing state model with its pure transitions,
//! the error taxonomy, and saved-server persistence. Everything here is
//! synchronous and side-effect free apart from the config module's file I/O;
//! the async machinery lives in `tether-client` and `tether-discovery`.

pub mod config;
pub mod error;
pub mod state;
pub mod time;
pub mod types;

pub use error::{ConfigError, ConnectError, TetherError, ThreadError};
pub use state::{AccountState, AppState, ChatMessage, ThreadState};
pub use types::{
    ConnectionStatus, DiscoverySource, MessageRole, ModelSelection, ServerConfig, ServerId,
    ThreadKey, ThreadStatus,
};
