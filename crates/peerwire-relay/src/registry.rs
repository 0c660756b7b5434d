//! In-memory registry of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use peerwire_core::SessionId;

use crate::session::SessionHandle;

/// Thread-safe registry of sessions that have not finished teardown yet.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: SessionHandle) {
        let id = session.id();
        self.sessions.write().await.insert(id, session);
        debug!(session = %id, "Session registered");
    }

    /// Remove a session.
    pub async fn unregister(&self, id: SessionId) -> Option<SessionHandle> {
        let session = self.sessions.write().await.remove(&id);
        if session.is_some() {
            debug!(session = %id, "Session unregistered");
        } else {
            warn!(session = %id, "Tried to unregister unknown session");
        }
        session
    }

    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Count of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use peerwire_core::ParticipantId;
    use peerwire_core::config::SessionConfig;

    use super::*;
    use crate::bus::{BusClient, MemoryBus};
    use crate::connection::duplex;
    use crate::relay::Relay;

    async fn session(relay: &Relay, me: &str, peer: &str) -> SessionHandle {
        let (conn, _remote) = duplex();
        relay
            .accept(conn, ParticipantId::new(me), ParticipantId::new(peer))
            .await
            .unwrap()
    }

    fn relay() -> Relay {
        let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
        Relay::new(bus, SessionConfig::default())
    }

    #[tokio::test]
    async fn register_and_list_sessions() {
        let relay = relay();
        let registry = SessionRegistry::new();
        let a = session(&relay, "alice", "bob").await;
        let b = session(&relay, "bob", "alice").await;

        registry.register(a.clone()).await;
        registry.register(b.clone()).await;

        let mut ids: Vec<SessionId> = registry
            .sessions()
            .await
            .iter()
            .map(SessionHandle::id)
            .collect();
        let mut expected = vec![a.id(), b.id()];
        ids.sort_by_key(ToString::to_string);
        expected.sort_by_key(ToString::to_string);
        assert_eq!(ids, expected);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn unregister_session() {
        let relay = relay();
        let registry = SessionRegistry::new();
        let s = session(&relay, "alice", "bob").await;
        registry.register(s.clone()).await;

        assert!(registry.unregister(s.id()).await.is_some());
        assert!(registry.unregister(s.id()).await.is_none());
        assert_eq!(registry.count().await, 0);
    }
}
