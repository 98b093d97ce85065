//! tether-client: Connection coordinator and state store
//!
//! The coordinator manages one or more simultaneous links to agent-execution
//! servers, tracks conversation threads and in-flight turns, and reconciles
//! asynchronous push notifications into a consistent snapshot published by
//! the [`StateStore`]. Every mutating operation is serialized through one
//! worker task; that single ownership is the whole correctness story for the
//! shared registries, with no per-field locking.
//!
//! The byte-level wire and the local runtime are collaborators behind the
//! [`transport::Connector`] and [`launcher::RuntimeLauncher`] traits, with
//! one shipped implementation of each.

pub mod coordinator;
pub mod launcher;
pub mod messages;
pub mod store;
pub mod transport;

pub use coordinator::{ConnectionCoordinator, DisconnectTarget};
pub use launcher::{ProcessLauncher, RuntimeLauncher, RuntimeStatus};
pub use messages::OutgoingMessage;
pub use store::StateStore;
pub use transport::{Connection, Connector, RpcTransport, TcpConnector, TransportError};
