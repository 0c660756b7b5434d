//! One participant's side of a paired session.
//!
//! A session owns a connection, a bus subscription on the pair's topic, an
//! inbound pump task and a supervisor task. The supervisor owns the write
//! half of the connection and performs teardown once either side fails.

mod inbound;
mod lifecycle;
mod outbound;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use peerwire_core::config::SessionConfig;
use peerwire_core::{Origin, ParticipantId, SessionId, Topic, derive_topic};

use crate::bus::{BusClient, BusError, Subscription};
use crate::connection::{Connection, ConnectionError, FrameSink};

use lifecycle::Lifecycle;
use outbound::OutboundRelay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Pump running, subscription active.
    Open,
    /// Teardown triggered, resources still being released.
    Closing,
    /// Connection closed and subscription removed.
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// The participant closed the connection.
    PeerHungUp,
    /// The bus stopped delivering to this session's subscription.
    SubscriptionLost,
    /// Teardown requested through [`SessionHandle::close`].
    Requested,
    Failed(SessionError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerHungUp => f.write_str("peer hung up"),
            Self::SubscriptionLost => f.write_str("subscription lost"),
            Self::Requested => f.write_str("close requested"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Reading from connection failed: {0}")]
    ConnectionRead(ConnectionError),

    #[error("Writing to connection failed: {0}")]
    ConnectionWrite(ConnectionError),

    #[error("Publishing to bus failed: {0}")]
    Publish(BusError),

    #[error("Subscribing to {topic} failed: {source}")]
    SubscribeSetup { topic: String, source: BusError },

    #[error("Connection writer fell {capacity} frames behind")]
    SlowConsumer { capacity: usize },

    #[error("Rejected participant: {0}")]
    InvalidParticipant(String),

    #[error("Relay is shutting down")]
    ShuttingDown,
}

struct SessionInner {
    id: SessionId,
    participant: ParticipantId,
    peer: ParticipantId,
    topic: Topic,
    lifecycle: Lifecycle,
}

/// Cheap, cloneable view of a live (or finished) session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    fn new(participant: ParticipantId, peer: ParticipantId) -> Self {
        let topic = derive_topic(&participant, &peer);
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                participant,
                peer,
                topic,
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.inner.participant
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.inner.peer
    }

    pub fn topic(&self) -> &Topic {
        &self.inner.topic
    }

    /// Origin tag attached to everything this session publishes.
    pub fn origin(&self) -> Origin {
        Origin {
            participant: self.inner.participant.clone(),
            session: self.inner.id,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lifecycle.state()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lifecycle.reason().cloned()
    }

    /// Request teardown. Returns `false` if the session was already closing.
    pub fn close(&self) -> bool {
        self.close_with(CloseReason::Requested)
    }

    /// Wait until the session reached [`SessionState::Closed`].
    pub async fn closed(&self) {
        self.inner.lifecycle.closed().await;
    }

    fn close_with(&self, reason: CloseReason) -> bool {
        let first = self.inner.lifecycle.close(reason);
        if first {
            debug!(
                participant = %self.inner.participant,
                session = %self.inner.id,
                reason = %self.inner.lifecycle.reason().map(ToString::to_string).unwrap_or_default(),
                "Session closing"
            );
        }
        first
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("participant", &self.inner.participant)
            .field("peer", &self.inner.peer)
            .field("topic", &self.inner.topic)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns everything teardown has to release.
pub(crate) struct Supervisor<K: FrameSink> {
    session: SessionHandle,
    bus: Arc<dyn BusClient>,
    subscription: Subscription,
    sink: K,
    queue: mpsc::Receiver<bytes::Bytes>,
    pump: JoinHandle<()>,
}

/// Close a connection that never became a session.
pub(crate) async fn reject<C: Connection>(connection: C) {
    let (_source, mut sink) = connection.split();
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Closing rejected connection failed");
    }
}

/// Set up a session: subscribe the outbound relay, then launch the pump.
///
/// Ids that could alias another pair's topic and subscribe failures both
/// close the connection and return an error; nothing is left running.
pub(crate) async fn open<C: Connection>(
    bus: &Arc<dyn BusClient>,
    connection: C,
    participant: ParticipantId,
    peer: ParticipantId,
    config: &SessionConfig,
) -> Result<(SessionHandle, Supervisor<C::Sink>), SessionError> {
    if let Err(e) = participant.validate().and_then(|()| peer.validate()) {
        warn!(participant = %participant, peer = %peer, error = %e, "Rejecting session");
        reject(connection).await;
        return Err(SessionError::InvalidParticipant(e.to_string()));
    }

    let session = SessionHandle::new(participant, peer);
    let (source, mut sink) = connection.split();
    let (queue_tx, queue_rx) = mpsc::channel(config.write_queue_capacity.max(1));

    let relay = Arc::new(OutboundRelay::new(session.clone(), queue_tx));
    let subscription = match bus.subscribe(session.topic(), relay).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(
                participant = %session.participant(),
                session = %session.id(),
                topic = %session.topic(),
                error = %e,
                "Subscribe failed, rejecting session"
            );
            let error = SessionError::SubscribeSetup {
                topic: session.topic().to_string(),
                source: e,
            };
            session.close_with(CloseReason::Failed(error.clone()));
            drop(source);
            if let Err(e) = sink.close().await {
                debug!(session = %session.id(), error = %e, "Closing rejected connection failed");
            }
            session.lifecycle().mark_closed();
            return Err(error);
        }
    };

    let pump = inbound::spawn(source, Arc::clone(bus), session.clone());

    info!(
        participant = %session.participant(),
        peer = %session.peer(),
        session = %session.id(),
        topic = %session.topic(),
        "Session opened"
    );

    let supervisor = Supervisor {
        session: session.clone(),
        bus: Arc::clone(bus),
        subscription,
        sink,
        queue: queue_rx,
        pump,
    };
    Ok((session, supervisor))
}

impl<K: FrameSink> Supervisor<K> {
    /// Run the writer until teardown begins, then release everything once.
    pub(crate) async fn run(self) {
        let Self {
            session,
            bus,
            subscription,
            sink,
            queue,
            pump,
        } = self;

        let watch_pump = async {
            if let Err(e) = pump.await {
                error!(session = %session.id(), error = %e, "Inbound pump aborted");
                session.close_with(CloseReason::Failed(SessionError::ConnectionRead(
                    ConnectionError::Transport(e.to_string()),
                )));
            }
        };
        let (mut sink, ()) = tokio::join!(outbound::run_writer(sink, queue, &session), watch_pump);

        if let Err(e) = bus.unsubscribe(subscription).await {
            warn!(session = %session.id(), error = %e, "Unsubscribe failed");
        }
        if let Err(e) = sink.close().await {
            debug!(session = %session.id(), error = %e, "Closing connection failed");
        }
        session.lifecycle().mark_closed();

        info!(
            participant = %session.participant(),
            session = %session.id(),
            topic = %session.topic(),
            reason = %session.close_reason().map(|r| r.to_string()).unwrap_or_default(),
            "Session closed"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::time::timeout;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::connection::duplex;

    const WAIT: Duration = Duration::from_secs(2);

    async fn start(
        bus: &Arc<dyn BusClient>,
        me: &str,
        peer: &str,
    ) -> (SessionHandle, crate::connection::RemotePeer) {
        let (conn, remote) = duplex();
        let (session, supervisor) = open(
            bus,
            conn,
            ParticipantId::new(me),
            ParticipantId::new(peer),
            &SessionConfig::default(),
        )
        .await
        .unwrap();
        tokio::spawn(supervisor.run());
        (session, remote)
    }

    #[tokio::test]
    async fn own_publications_are_not_echoed() {
        let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
        let (alice, mut alice_remote) = start(&bus, "alice", "bob").await;
        let (_bob, mut bob_remote) = start(&bus, "bob", "alice").await;

        alice_remote.send("offer");
        assert_eq!(
            timeout(WAIT, bob_remote.recv()).await.unwrap(),
            Some(Bytes::from("offer"))
        );

        // Round-trip a reply so alice's echo, if any, would already be queued.
        bob_remote.send("answer");
        assert_eq!(
            timeout(WAIT, alice_remote.recv()).await.unwrap(),
            Some(Bytes::from("answer"))
        );
        assert!(alice_remote.try_recv().is_none());
        assert_eq!(alice.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn duplicate_participant_sessions_still_hear_each_other() {
        let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
        let (_first, first_remote) = start(&bus, "alice", "bob").await;
        let (_second, mut second_remote) = start(&bus, "alice", "bob").await;

        first_remote.send("from tab one");
        assert_eq!(
            timeout(WAIT, second_remote.recv()).await.unwrap(),
            Some(Bytes::from("from tab one"))
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_and_closes_connection_once() {
        let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
        let (session, remote) = start(&bus, "alice", "bob").await;

        assert!(session.close());
        assert!(!session.close());
        timeout(WAIT, session.closed()).await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.close_reason(), Some(CloseReason::Requested)));
        assert_eq!(remote.close_calls(), 1);
    }

    #[tokio::test]
    async fn full_write_queue_tears_session_down() {
        let bus: Arc<dyn BusClient> = Arc::new(MemoryBus::new());
        let (conn, remote) = duplex();
        let config = SessionConfig {
            write_queue_capacity: 1,
        };
        let (session, supervisor) = open(
            &bus,
            conn,
            ParticipantId::new("alice"),
            ParticipantId::new("bob"),
            &config,
        )
        .await
        .unwrap();

        // Supervisor not running yet, so nothing drains the queue.
        let bob = SessionHandle::new(ParticipantId::new("bob"), ParticipantId::new("alice"));
        for frame in ["one", "two"] {
            bus.publish(
                session.topic(),
                peerwire_core::Envelope::new(bob.origin(), Bytes::from(frame)),
            )
            .await
            .unwrap();
        }
        assert!(matches!(
            session.close_reason(),
            Some(CloseReason::Failed(SessionError::SlowConsumer { capacity: 1 }))
        ));

        tokio::spawn(supervisor.run());
        timeout(WAIT, session.closed()).await.unwrap();
        assert!(remote.is_closed());
    }
}
