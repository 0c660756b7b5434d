//! Topic-addressed publish/subscribe bus consumed by the relay.
//!
//! The bus is shared by every session in the process. Delivery is
//! at-least-once to every current subscriber of a topic, *including* the
//! publisher's own subscription; callers are responsible for dropping their
//! own echoes.

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use peerwire_core::{Envelope, Topic};

pub use memory::MemoryBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;

/// Receives envelopes delivered on a subscribed topic.
///
/// Implementations must not block: the bus may invoke `deliver` from its own
/// dispatch task, concurrently for different envelopes, and shared across
/// sessions.
pub trait DeliveryHandler: Send + Sync + 'static {
    fn deliver(&self, envelope: Envelope);
}

/// Handle for one live registration of a [`DeliveryHandler`] on a topic.
///
/// Passed back to [`BusClient::unsubscribe`] to remove the registration.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
}

impl Subscription {
    pub const fn new(id: SubscriptionId, topic: Topic) -> Self {
        Self { id, topic }
    }

    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    pub const fn topic(&self) -> &Topic {
        &self.topic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Publish/subscribe capability backing the relay.
#[async_trait]
pub trait BusClient: Send + Sync + 'static {
    /// Publish an envelope to every current subscriber of `topic`.
    async fn publish(&self, topic: &Topic, envelope: Envelope) -> Result<(), BusError>;

    /// Register `handler` for every envelope subsequently published on `topic`.
    async fn subscribe(
        &self,
        topic: &Topic,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError>;

    /// Remove a registration. Once this returns, the handler is no longer
    /// invoked for new publications.
    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), BusError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Connecting to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Publish to {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe to {topic} failed: {message}")]
    Subscribe { topic: String, message: String },

    #[error("Unsubscribe {subscription} failed: {message}")]
    Unsubscribe { subscription: String, message: String },

    #[error("Bus connection closed")]
    Closed,
}
