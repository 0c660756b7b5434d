//! Outbound relay: bus deliveries → connection.
//!
//! The bus invokes [`OutboundRelay::deliver`] from its own dispatch context.
//! Delivery never touches the connection directly: it drops echoes of this
//! session's own publications and enqueues everything else for the single
//! writer, which owns the write half for the whole session.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use peerwire_core::Envelope;

use crate::bus::DeliveryHandler;
use crate::connection::FrameSink;

use super::{CloseReason, SessionError, SessionHandle};

pub(crate) struct OutboundRelay {
    session: SessionHandle,
    queue: mpsc::Sender<Bytes>,
}

impl OutboundRelay {
    pub(crate) const fn new(session: SessionHandle, queue: mpsc::Sender<Bytes>) -> Self {
        Self { session, queue }
    }
}

impl DeliveryHandler for OutboundRelay {
    fn deliver(&self, envelope: Envelope) {
        if envelope.is_from(self.session.id()) {
            trace!(session = %self.session.id(), "Echo suppressed");
            return;
        }
        if self.session.lifecycle().is_closing() {
            return;
        }

        match self.queue.try_send(envelope.payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let capacity = self.queue.max_capacity();
                warn!(
                    participant = %self.session.participant(),
                    session = %self.session.id(),
                    capacity,
                    "Connection writer cannot keep up, closing session"
                );
                self.session
                    .close_with(CloseReason::Failed(SessionError::SlowConsumer { capacity }));
            }
            // Writer already gone; teardown is under way.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Drain the queue into the connection until teardown begins.
///
/// Returns the sink so the supervisor can close it exactly once.
pub(crate) async fn run_writer<K: FrameSink>(
    mut sink: K,
    mut queue: mpsc::Receiver<Bytes>,
    session: &SessionHandle,
) -> K {
    let mut written = 0u64;

    loop {
        let payload = tokio::select! {
            biased;
            () = session.lifecycle().cancelled() => break,
            next = queue.recv() => match next {
                Some(payload) => payload,
                None => {
                    // Every sender lives in the bus registration.
                    warn!(
                        participant = %session.participant(),
                        session = %session.id(),
                        "Bus dropped the subscription, closing session"
                    );
                    session.close_with(CloseReason::SubscriptionLost);
                    break;
                }
            },
        };

        if let Err(e) = sink.write(payload).await {
            warn!(
                participant = %session.participant(),
                session = %session.id(),
                error = %e,
                "Writing to connection failed, closing session"
            );
            session.close_with(CloseReason::Failed(SessionError::ConnectionWrite(e)));
            break;
        }
        written += 1;
    }

    debug!(session = %session.id(), written, "Connection writer stopped");
    sink
}
