//! peerwire Relay Server Library
//!
//! Core functionality for the peerwire relay:
//! - Bus client abstraction with in-memory and NATS implementations
//! - Connection abstraction with WebSocket and in-memory implementations
//! - Per-connection sessions: inbound pump, outbound relay, teardown
//! - Session registry and the `Relay` entry point
//! - axum acceptance endpoint

pub mod bus;
pub mod connection;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use relay::Relay;
pub use session::{CloseReason, SessionError, SessionHandle, SessionState};
