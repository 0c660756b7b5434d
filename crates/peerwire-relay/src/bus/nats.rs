//! NATS-backed bus.
//!
//! Topics map one-to-one onto NATS subjects. The origin travels in message
//! headers so that payloads stay byte-for-byte what the participant sent.
//! Each subscription is drained by its own task which invokes the handler;
//! unsubscribing stops that task and sends `UNSUB` to the server.

use std::collections::HashMap;
use std::sync::Arc;

use async_nats::{Client, HeaderMap, Message, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use peerwire_core::{Envelope, Origin, ParticipantId, SessionId, Topic};

use super::{BusClient, BusError, DeliveryHandler, Subscription, SubscriptionId};

/// Header carrying the publishing participant id.
pub const PARTICIPANT_HEADER: &str = "Peerwire-Participant";
/// Header carrying the publishing session id.
pub const SESSION_HEADER: &str = "Peerwire-Session";

struct Drain {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), BusError>>,
}

/// Bus client over a shared NATS connection.
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    drains: Arc<Mutex<HashMap<SubscriptionId, Drain>>>,
}

impl NatsBus {
    /// Connect to the NATS server at `url`.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        info!(url = %url, "Connected to NATS");
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            drains: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Encode the origin of an envelope into NATS headers.
pub fn origin_headers(origin: &Origin) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(PARTICIPANT_HEADER, origin.participant.as_str());
    headers.insert(SESSION_HEADER, origin.session.to_string().as_str());
    headers
}

/// Recover the origin from NATS headers, if both are present and well-formed.
pub fn origin_from_headers(headers: Option<&HeaderMap>) -> Option<Origin> {
    let headers = headers?;
    let participant = headers.get(PARTICIPANT_HEADER)?.as_str();
    let session = headers.get(SESSION_HEADER)?.as_str().parse::<SessionId>().ok()?;
    Some(Origin {
        participant: ParticipantId::new(participant),
        session,
    })
}

fn to_envelope(message: Message) -> Option<Envelope> {
    let origin = origin_from_headers(message.headers.as_ref())?;
    Some(Envelope::new(origin, message.payload))
}

async fn drain(
    mut subscriber: Subscriber,
    topic: Topic,
    handler: Arc<dyn DeliveryHandler>,
    cancel: CancellationToken,
) -> Result<(), BusError> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = subscriber.next() => match next {
                Some(message) => match to_envelope(message) {
                    Some(envelope) => handler.deliver(envelope),
                    None => warn!(topic = %topic, "Dropping message without origin headers"),
                },
                None => {
                    warn!(topic = %topic, "NATS subscription ended");
                    return Ok(());
                }
            }
        }
    }

    subscriber
        .unsubscribe()
        .await
        .map_err(|e| BusError::Unsubscribe {
            subscription: topic.to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl BusClient for NatsBus {
    async fn publish(&self, topic: &Topic, envelope: Envelope) -> Result<(), BusError> {
        self.client
            .publish_with_headers(
                topic.to_string(),
                origin_headers(&envelope.origin),
                envelope.payload,
            )
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| BusError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        let id = SubscriptionId::next();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drain(subscriber, topic.clone(), handler, cancel.clone()));
        self.drains.lock().await.insert(id, Drain { cancel, task });

        debug!(topic = %topic, subscription = %id, "Subscribed on NATS");
        Ok(Subscription::new(id, topic.clone()))
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), BusError> {
        let Some(drain) = self.drains.lock().await.remove(&subscription.id()) else {
            warn!(subscription = %subscription.id(), "Tried to remove unknown subscription");
            return Ok(());
        };
        drain.cancel.cancel();
        let result = drain.task.await.map_err(|e| BusError::Unsubscribe {
            subscription: subscription.id().to_string(),
            message: e.to_string(),
        })?;
        debug!(topic = %subscription.topic(), subscription = %subscription.id(), "Unsubscribed from NATS");
        result
    }
}
