//! Inbound pump: connection frames → bus.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use peerwire_core::Envelope;

use crate::bus::BusClient;
use crate::connection::FrameSource;

use super::{CloseReason, SessionError, SessionHandle};

/// Spawn the pump for `session`. It runs until the connection fails, a
/// publish fails, or teardown is triggered elsewhere.
pub(crate) fn spawn<S: FrameSource>(
    source: S,
    bus: Arc<dyn BusClient>,
    session: SessionHandle,
) -> JoinHandle<()> {
    tokio::spawn(run(source, bus, session))
}

async fn run<S: FrameSource>(mut source: S, bus: Arc<dyn BusClient>, session: SessionHandle) {
    let origin = session.origin();
    let mut published = 0u64;

    loop {
        let frame = tokio::select! {
            biased;
            () = session.lifecycle().cancelled() => break,
            frame = source.read() => frame,
        };

        match frame {
            Ok(Some(payload)) => {
                if session.lifecycle().is_closing() {
                    break;
                }
                let bytes = payload.len();
                let envelope = Envelope::new(origin.clone(), payload);
                if let Err(e) = bus.publish(session.topic(), envelope).await {
                    warn!(
                        participant = %session.participant(),
                        session = %session.id(),
                        topic = %session.topic(),
                        error = %e,
                        "Publish failed, closing session"
                    );
                    session.close_with(CloseReason::Failed(SessionError::Publish(e)));
                    break;
                }
                published += 1;
                trace!(session = %session.id(), bytes, "Frame published");
            }
            Ok(None) => {
                info!(
                    participant = %session.participant(),
                    session = %session.id(),
                    "Participant hung up"
                );
                session.close_with(CloseReason::PeerHungUp);
                break;
            }
            Err(e) => {
                warn!(
                    participant = %session.participant(),
                    session = %session.id(),
                    error = %e,
                    "Reading from connection failed, closing session"
                );
                session.close_with(CloseReason::Failed(SessionError::ConnectionRead(e)));
                break;
            }
        }
    }

    debug!(session = %session.id(), published, "Inbound pump stopped");
}
