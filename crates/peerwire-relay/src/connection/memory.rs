//! In-memory duplex connection.
//!
//! [`duplex`] returns the relay-side [`MemoryConnection`] together with a
//! [`RemotePeer`] that plays the participant: it sends frames, receives what
//! the relay writes, hangs up, and can inject read or write failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::{Connection, ConnectionError, FrameSink, FrameSource};

type Inbound = Result<Bytes, ConnectionError>;

struct Shared {
    closed: watch::Sender<bool>,
    close_calls: AtomicUsize,
    write_attempts: AtomicUsize,
    fail_writes: AtomicBool,
}

/// Create a connected pair.
pub fn duplex() -> (MemoryConnection, RemotePeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        closed: watch::Sender::new(false),
        close_calls: AtomicUsize::new(0),
        write_attempts: AtomicUsize::new(0),
        fail_writes: AtomicBool::new(false),
    });
    (
        MemoryConnection {
            inbound: inbound_rx,
            outbound: outbound_tx,
            shared: Arc::clone(&shared),
        },
        RemotePeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            shared,
        },
    )
}

/// Relay-side end of a [`duplex`] pair.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl Connection for MemoryConnection {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn split(self) -> (MemorySource, MemorySink) {
        (
            MemorySource {
                inbound: self.inbound,
            },
            MemorySink {
                outbound: self.outbound,
                shared: self.shared,
            },
        )
    }
}

pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn read(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        self.inbound.recv().await.transpose()
    }
}

pub struct MemorySink {
    outbound: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write(&mut self, payload: Bytes) -> Result<(), ConnectionError> {
        self.shared.write_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.shared.closed.borrow() {
            return Err(ConnectionError::Closed);
        }
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("injected write failure".into()));
        }
        self.outbound
            .send(payload)
            .map_err(|_| ConnectionError::Transport("remote peer dropped".into()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.send_replace(true);
        Ok(())
    }
}

/// Participant-side end of a [`duplex`] pair.
pub struct RemotePeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

impl RemotePeer {
    /// Send a frame to the relay. Returns `false` once hung up or once the
    /// relay stopped reading.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(payload.into())).is_ok())
    }

    /// Make the relay's next read fail.
    pub fn inject_read_error(&self, message: &str) -> bool {
        self.inbound.as_ref().is_some_and(|tx| {
            tx.send(Err(ConnectionError::Transport(message.to_string())))
                .is_ok()
        })
    }

    /// Make every subsequent relay write fail.
    pub fn fail_writes(&self) {
        self.shared.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Orderly hang-up: the relay's next read returns end of stream.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait for the next frame written by the relay.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Take a frame written by the relay, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    /// Wait until the relay closed its side.
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// How many times the relay called `close`.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// How many writes the relay attempted, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.shared.write_attempts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (conn, mut remote) = duplex();
        let (mut source, mut sink) = conn.split();

        assert!(remote.send("hello"));
        assert_eq!(source.read().await.unwrap(), Some(Bytes::from("hello")));

        sink.write(Bytes::from("world")).await.unwrap();
        assert_eq!(remote.recv().await, Some(Bytes::from("world")));
        assert_eq!(remote.write_attempts(), 1);
    }

    #[tokio::test]
    async fn hang_up_reads_as_end_of_stream() {
        let (conn, mut remote) = duplex();
        let (mut source, _sink) = conn.split();

        remote.hang_up();
        assert_eq!(source.read().await.unwrap(), None);
        assert!(!remote.send("too late"));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let (conn, remote) = duplex();
        let (mut source, mut sink) = conn.split();

        remote.inject_read_error("boom");
        assert!(matches!(
            source.read().await,
            Err(ConnectionError::Transport(_))
        ));

        remote.fail_writes();
        assert!(sink.write(Bytes::from("x")).await.is_err());
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let (conn, remote) = duplex();
        let (_source, mut sink) = conn.split();

        sink.close().await.unwrap();
        remote.wait_closed().await;
        assert!(remote.is_closed());
        assert!(matches!(
            sink.write(Bytes::from("x")).await,
            Err(ConnectionError::Closed)
        ));
        assert_eq!(remote.close_calls(), 1);
    }
}
