//! In-process bus.
//!
//! Pairs sessions living in the same process. Publication fans out
//! synchronously to a snapshot of the topic's subscribers taken under the
//! lock; handlers run after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use peerwire_core::{Envelope, Topic};

use super::{BusClient, BusError, DeliveryHandler, Subscription, SubscriptionId};

type Subscribers = HashMap<SubscriptionId, Arc<dyn DeliveryHandler>>;

/// Thread-safe in-memory topic map.
#[derive(Clone, Default)]
pub struct MemoryBus {
    topics: Arc<RwLock<HashMap<Topic, Subscribers>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.read().await.get(topic).map_or(0, HashMap::len)
    }

    /// Number of topics with at least one subscriber.
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// Refuse all further operations and drop every registration.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.topics.write().await.clear();
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn publish(&self, topic: &Topic, envelope: Envelope) -> Result<(), BusError> {
        self.ensure_open()?;
        let handlers: Vec<Arc<dyn DeliveryHandler>> = self
            .topics
            .read()
            .await
            .get(topic)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default();

        debug!(topic = %topic, subscribers = handlers.len(), "Publishing envelope");
        for handler in handlers {
            handler.deliver(envelope.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError> {
        self.ensure_open()?;
        let id = SubscriptionId::next();
        self.topics
            .write()
            .await
            .entry(topic.clone())
            .or_default()
            .insert(id, handler);
        debug!(topic = %topic, subscription = %id, "Subscribed");
        Ok(Subscription::new(id, topic.clone()))
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), BusError> {
        let mut topics = self.topics.write().await;
        let Some(subs) = topics.get_mut(subscription.topic()) else {
            warn!(subscription = %subscription.id(), "Tried to unsubscribe from unknown topic");
            return Ok(());
        };
        if subs.remove(&subscription.id()).is_none() {
            warn!(subscription = %subscription.id(), "Tried to remove unknown subscription");
        }
        if subs.is_empty() {
            topics.remove(subscription.topic());
        }
        debug!(topic = %subscription.topic(), subscription = %subscription.id(), "Unsubscribed");
        Ok(())
    }
}
