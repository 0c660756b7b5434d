//! Message-framed duplex connections to one participant.
//!
//! A [`Connection`] is split once, at session start, into a read half owned
//! by the inbound pump and a write half owned by the session's single
//! writer. Nothing else touches either half.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::{MemoryConnection, RemotePeer, duplex};
pub use ws::WsConnection;

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame.
    ///
    /// `Ok(None)` means the participant hung up in an orderly way.
    async fn read(&mut self) -> Result<Option<Bytes>, ConnectionError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn write(&mut self, payload: Bytes) -> Result<(), ConnectionError>;

    /// Close the connection. Calling this more than once is a no-op.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// A duplex connection handed to the relay by the acceptance layer.
pub trait Connection: Send + 'static {
    type Source: FrameSource;
    type Sink: FrameSink;

    fn split(self) -> (Self::Source, Self::Sink);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection already closed")]
    Closed,
}
