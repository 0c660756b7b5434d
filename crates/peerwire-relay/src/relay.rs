//! Relay entry point.
//!
//! The acceptance layer hands every upgraded connection to
//! [`Relay::accept`] together with the two participant ids. The relay owns
//! the shared bus client and the registry of live sessions.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use peerwire_core::ParticipantId;
use peerwire_core::config::SessionConfig;

use crate::bus::BusClient;
use crate::connection::Connection;
use crate::registry::SessionRegistry;
use crate::session::{self, SessionError, SessionHandle};

/// Pairs participants' connections over a shared bus.
pub struct Relay {
    bus: Arc<dyn BusClient>,
    registry: SessionRegistry,
    config: SessionConfig,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(bus: Arc<dyn BusClient>, config: SessionConfig) -> Self {
        Self {
            bus,
            registry: SessionRegistry::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start a session for `participant` talking to `peer` over `connection`.
    ///
    /// Returns as soon as the bus subscription is registered and the inbound
    /// pump is running. If the subscription cannot be established the
    /// connection is closed and [`SessionError::SubscribeSetup`] returned;
    /// other sessions are unaffected. Once [`Relay::shutdown`] has started
    /// the connection is closed and [`SessionError::ShuttingDown`] returned.
    pub async fn accept<C: Connection>(
        &self,
        connection: C,
        participant: ParticipantId,
        peer: ParticipantId,
    ) -> Result<SessionHandle, SessionError> {
        if self.shutdown.is_cancelled() {
            warn!(participant = %participant, "Refusing session during shutdown");
            session::reject(connection).await;
            return Err(SessionError::ShuttingDown);
        }

        let (handle, supervisor) =
            session::open(&self.bus, connection, participant, peer, &self.config).await?;

        self.registry.register(handle.clone()).await;
        // Shutdown may have taken its snapshot while the subscribe was in flight.
        if self.shutdown.is_cancelled() {
            handle.close();
        }
        let registry = self.registry.clone();
        let id = handle.id();
        tokio::spawn(async move {
            supervisor.run().await;
            registry.unregister(id).await;
        });

        Ok(handle)
    }

    pub async fn session_count(&self) -> usize {
        self.registry.count().await
    }

    /// Refuse new sessions, close every live one and wait for their
    /// teardown to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let sessions = self.registry.sessions().await;
        let count = sessions.len();
        for session in &sessions {
            session.close();
        }
        for session in &sessions {
            session.closed().await;
        }
        info!(count, "All sessions closed");
    }
}
