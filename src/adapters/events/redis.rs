//! Redis pub/sub event bus.
//!
//! Production transport for multi-instance deployments. Redis pub/sub
//! broadcasts every published message to every subscriber, which is what
//! lets an event published by one process reach sockets held by any
//! process. Subscription names are still kept per-process unique by the
//! composition root so the design stays correct on transports that
//! load-balance instead.
//!
//! Redis pub/sub is fire-and-forget: there is no redelivery after a
//! handler failure, and messages published while a subscriber is
//! reconnecting are missed. Both degrade to poll/refresh visibility,
//! which the delivery design tolerates.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ports::{
    Attributes, BusError, BusHealth, BusMessage, BusMessageHandler, EventBus, SubscriptionConfig,
};

/// Envelope serialized onto the Redis channel. Carries the attributes and
/// transport message id alongside the payload bytes.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    message_id: String,
    attributes: Attributes,
    data: Vec<u8>,
}

struct Subscription {
    topic: String,
    listener: Option<JoinHandle<()>>,
}

/// Event bus over Redis pub/sub channels.
pub struct RedisEventBus {
    client: redis::Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    closed: AtomicBool,
}

impl RedisEventBus {
    /// Connects lazily: construction only parses the URL.
    pub fn new(url: &str) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            publisher: Mutex::new(None),
            subscriptions: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the cached publish connection, dialing if necessary.
    async fn publish_connection(&self) -> Result<MultiplexedConnection, BusError> {
        let mut guard = self.publisher.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_publish_connection(&self) {
        *self.publisher.lock().await = None;
    }
}

/// Listener loop for one subscription: dials, subscribes to the channel,
/// and feeds decoded messages to the handler until aborted.
async fn run_listener(client: redis::Client, topic: String, handler: Arc<dyn BusMessageHandler>) {
    loop {
        match client.get_async_connection().await {
            Ok(conn) => {
                let mut pubsub = conn.into_pubsub();
                if let Err(e) = pubsub.subscribe(&topic).await {
                    tracing::warn!(topic = %topic, error = %e, "Redis subscribe failed");
                } else {
                    tracing::info!(topic = %topic, handler = handler.name(), "Redis listener attached");
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: Vec<u8> = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::warn!(error = %e, "Unreadable Redis payload dropped");
                                continue;
                            }
                        };
                        match serde_json::from_slice::<WireMessage>(&payload) {
                            Ok(wire) => {
                                let message = BusMessage {
                                    message_id: wire.message_id,
                                    data: wire.data,
                                    attributes: wire.attributes,
                                };
                                if let Err(e) = handler.handle(message).await {
                                    // No redelivery on this transport; the
                                    // failure is logged and the loop moves on.
                                    tracing::warn!(
                                        handler = handler.name(),
                                        error = %e,
                                        "Event handler failed"
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Malformed wire message dropped");
                            }
                        }
                    }
                    tracing::warn!(topic = %topic, "Redis pub/sub stream ended, reconnecting");
                }
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Redis connection failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<String, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let wire = WireMessage {
            message_id: Uuid::new_v4().to_string(),
            attributes,
            data,
        };
        let payload =
            serde_json::to_vec(&wire).map_err(|e| BusError::Serialization(e.to_string()))?;

        let mut conn = self.publish_connection().await?;
        if let Err(e) = conn.publish::<_, _, i64>(topic, payload).await {
            // Drop the cached connection so the next publish re-dials.
            self.drop_publish_connection().await;
            return Err(BusError::Connection(e.to_string()));
        }

        Ok(wire.message_id)
    }

    async fn create_topic(&self, _topic: &str) -> Result<(), BusError> {
        // Redis channels exist implicitly.
        Ok(())
    }

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        config: SubscriptionConfig,
    ) -> Result<(), BusError> {
        if config.enable_message_ordering {
            tracing::debug!(
                subscription = subscription,
                "Redis pub/sub has no ordering guarantee; option ignored"
            );
        }
        self.subscriptions.write().await.insert(
            subscription.to_string(),
            Subscription {
                topic: topic.to_string(),
                listener: None,
            },
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: &str,
        handler: Arc<dyn BusMessageHandler>,
    ) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(subscription)
            .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;

        if let Some(previous) = sub.listener.take() {
            previous.abort();
        }
        sub.listener = Some(tokio::spawn(run_listener(
            self.client.clone(),
            sub.topic.clone(),
            handler,
        )));
        Ok(())
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), BusError> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(subscription)
            .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;
        if let Some(listener) = sub.listener.take() {
            listener.abort();
        }
        Ok(())
    }

    async fn check_health(&self) -> BusHealth {
        if self.closed.load(Ordering::SeqCst) {
            return BusHealth::Unhealthy {
                details: "bus closed".to_string(),
            };
        }
        let mut conn = match self.publish_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                return BusHealth::Unhealthy {
                    details: e.to_string(),
                }
            }
        };
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => BusHealth::Healthy,
            Err(e) => {
                self.drop_publish_connection().await;
                BusHealth::Unhealthy {
                    details: e.to_string(),
                }
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        for sub in self.subscriptions.write().await.values_mut() {
            if let Some(listener) = sub.listener.take() {
                listener.abort();
            }
        }
        self.drop_publish_connection().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_roundtrips() {
        let mut attributes = Attributes::new();
        attributes.insert("kind".to_string(), "message:new".to_string());
        let wire = WireMessage {
            message_id: "m-1".to_string(),
            attributes,
            data: b"{\"hello\":true}".to_vec(),
        };

        let bytes = serde_json::to_vec(&wire).unwrap();
        let parsed: WireMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.message_id, "m-1");
        assert_eq!(parsed.attributes.get("kind").unwrap(), "message:new");
        assert_eq!(parsed.data, wire.data);
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RedisEventBus::new("not-a-url").is_err());
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() {
        let bus = RedisEventBus::new("redis://localhost:6379").unwrap();
        bus.close().await.unwrap();

        let result = bus
            .publish("events", b"{}".to_vec(), Attributes::new())
            .await;
        assert!(matches!(result, Err(BusError::Closed)));
    }
}
