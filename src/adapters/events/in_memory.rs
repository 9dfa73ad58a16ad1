//! In-memory event bus.
//!
//! Deterministic, synchronous delivery: `publish` invokes every attached
//! handler before returning. Used by the test suite and by single-process
//! deployments. Published messages are retained so tests can assert on
//! them and replay them to exercise at-least-once handling.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ports::{
    Attributes, BusError, BusHealth, BusMessage, BusMessageHandler, EventBus, SubscriptionConfig,
};

struct Subscription {
    topic: String,
    #[allow(dead_code)]
    config: SubscriptionConfig,
    handler: Option<Arc<dyn BusMessageHandler>>,
}

/// Process-local event bus with broadcast delivery.
pub struct InMemoryEventBus {
    topics: RwLock<HashSet<String>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    published: RwLock<Vec<(String, BusMessage)>>,
    closed: AtomicBool,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashSet::new()),
            subscriptions: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    // === Test Helpers ===

    /// Returns all published (topic, message) pairs.
    pub async fn published(&self) -> Vec<(String, BusMessage)> {
        self.published.read().await.clone()
    }

    /// Returns count of published messages.
    pub async fn message_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Returns published messages carrying the given attribute value.
    pub async fn published_with_attribute(&self, key: &str, value: &str) -> Vec<BusMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|(_, m)| m.attributes.get(key).map(String::as_str) == Some(value))
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Clears the published log (for test isolation).
    pub async fn clear(&self) {
        self.published.write().await.clear();
    }

    /// Re-delivers every retained message on the given subscription's
    /// topic. Simulates the at-least-once transport redelivering.
    pub async fn redeliver(&self, subscription: &str) -> Result<(), BusError> {
        let (topic, handler) = {
            let subs = self.subscriptions.read().await;
            let sub = subs
                .get(subscription)
                .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;
            (sub.topic.clone(), sub.handler.clone())
        };
        let Some(handler) = handler else {
            return Ok(());
        };

        let replay: Vec<BusMessage> = self
            .published
            .read()
            .await
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, m)| m.clone())
            .collect();

        for message in replay {
            if let Err(e) = handler.handle(message).await {
                tracing::warn!(handler = handler.name(), error = %e, "Handler failed on redelivery");
            }
        }
        Ok(())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<String, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if !self.topics.read().await.contains(topic) {
            return Err(BusError::TopicNotFound(topic.to_string()));
        }

        let message = BusMessage {
            message_id: Uuid::new_v4().to_string(),
            data,
            attributes,
        };

        self.published
            .write()
            .await
            .push((topic.to_string(), message.clone()));

        // Snapshot handlers so no lock is held across handler awaits.
        let handlers: Vec<Arc<dyn BusMessageHandler>> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.topic == topic)
            .filter_map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            if let Err(e) = handler.handle(message.clone()).await {
                // Handler failures never fail the publish; the transport
                // contract is that the subscription loop survives them.
                tracing::warn!(handler = handler.name(), error = %e, "Event handler failed");
            }
        }

        Ok(message.message_id)
    }

    async fn create_topic(&self, topic: &str) -> Result<(), BusError> {
        self.topics.write().await.insert(topic.to_string());
        Ok(())
    }

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        config: SubscriptionConfig,
    ) -> Result<(), BusError> {
        if !self.topics.read().await.contains(topic) {
            return Err(BusError::TopicNotFound(topic.to_string()));
        }
        self.subscriptions.write().await.insert(
            subscription.to_string(),
            Subscription {
                topic: topic.to_string(),
                config,
                handler: None,
            },
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: &str,
        handler: Arc<dyn BusMessageHandler>,
    ) -> Result<(), BusError> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(subscription)
            .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;
        sub.handler = Some(handler);
        Ok(())
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), BusError> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(subscription)
            .ok_or_else(|| BusError::SubscriptionNotFound(subscription.to_string()))?;
        sub.handler = None;
        Ok(())
    }

    async fn check_health(&self) -> BusHealth {
        if self.closed.load(Ordering::SeqCst) {
            BusHealth::Unhealthy {
                details: "bus closed".to_string(),
            }
        } else {
            BusHealth::Healthy
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        for sub in self.subscriptions.write().await.values_mut() {
            sub.handler = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::HandlerError;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BusMessageHandler for CountingHandler {
        async fn handle(&self, _: BusMessage) -> Result<(), HandlerError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl BusMessageHandler for FailingHandler {
        async fn handle(&self, _: BusMessage) -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }

        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    async fn bus_with_subscription() -> InMemoryEventBus {
        let bus = InMemoryEventBus::new();
        bus.create_topic("events").await.unwrap();
        bus.create_subscription("events", "events.sub", SubscriptionConfig::default())
            .await
            .unwrap();
        bus
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_fails() {
        let bus = InMemoryEventBus::new();
        let result = bus.publish("nope", b"{}".to_vec(), Attributes::new()).await;
        assert!(matches!(result, Err(BusError::TopicNotFound(_))));
    }

    #[tokio::test]
    async fn publish_stores_message() {
        let bus = bus_with_subscription().await;
        bus.publish("events", b"{}".to_vec(), Attributes::new())
            .await
            .unwrap();

        assert_eq!(bus.message_count().await, 1);
    }

    #[tokio::test]
    async fn subscribed_handler_receives_message() {
        let bus = bus_with_subscription().await;
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "events.sub",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        )
        .await
        .unwrap();

        bus.publish("events", b"{}".to_vec(), Attributes::new())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_subscription_on_topic_receives_message() {
        let bus = bus_with_subscription().await;
        bus.create_subscription("events", "events.sub2", SubscriptionConfig::default())
            .await
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        for name in ["events.sub", "events.sub2"] {
            bus.subscribe(
                name,
                Arc::new(CountingHandler {
                    count: count.clone(),
                }),
            )
            .await
            .unwrap();
        }

        bus.publish("events", b"{}".to_vec(), Attributes::new())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_failure_does_not_fail_publish() {
        let bus = bus_with_subscription().await;
        bus.subscribe("events.sub", Arc::new(FailingHandler))
            .await
            .unwrap();

        let result = bus.publish("events", b"{}".to_vec(), Attributes::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn redeliver_replays_retained_messages() {
        let bus = bus_with_subscription().await;
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "events.sub",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        )
        .await
        .unwrap();

        bus.publish("events", b"{}".to_vec(), Attributes::new())
            .await
            .unwrap();
        bus.redeliver("events.sub").await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = bus_with_subscription().await;
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            "events.sub",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        )
        .await
        .unwrap();
        bus.unsubscribe("events.sub").await.unwrap();

        bus.publish("events", b"{}".to_vec(), Attributes::new())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() {
        let bus = bus_with_subscription().await;
        bus.close().await.unwrap();

        let result = bus.publish("events", b"{}".to_vec(), Attributes::new()).await;
        assert!(matches!(result, Err(BusError::Closed)));
        assert!(!bus.check_health().await.is_healthy());
    }

    #[tokio::test]
    async fn attributes_are_retained() {
        let bus = bus_with_subscription().await;
        let mut attributes = Attributes::new();
        attributes.insert("kind".to_string(), "message:new".to_string());
        bus.publish("events", b"{}".to_vec(), attributes)
            .await
            .unwrap();

        let matches = bus.published_with_attribute("kind", "message:new").await;
        assert_eq!(matches.len(), 1);
    }
}
