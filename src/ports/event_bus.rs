//! EventBus port - Interface for the pub/sub transport.
//!
//! The bus is an external collaborator with at-least-once semantics:
//! events may be redelivered, reordered, or duplicated. Handlers ack by
//! returning `Ok` and nack (triggering redelivery where the transport
//! supports it) by returning an error. Handler failures must never take
//! down the subscription loop.
//!
//! Topic and subscription names are fixed strings shared across processes;
//! each process derives a unique subscription name so every process sees
//! every event on broadcast and load-balancing transports alike.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Errors surfaced by event bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The transport is unreachable or the connection dropped.
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// The payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Publishing to a topic that was never created.
    #[error("Unknown topic: {0}")]
    TopicNotFound(String),

    /// Subscribing to a subscription that was never created.
    #[error("Unknown subscription: {0}")]
    SubscriptionNotFound(String),

    /// The bus was closed.
    #[error("Bus closed")]
    Closed,
}

/// Message attributes, used for filtering and observability.
pub type Attributes = HashMap<String, String>;

/// A message as delivered to a subscription handler.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Transport-assigned id, stable across redeliveries of the same
    /// publish. Idempotency wrappers key on it.
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
}

/// Handler invoked for each delivered message.
///
/// Implementations should be idempotent: the same message may arrive more
/// than once.
#[async_trait]
pub trait BusMessageHandler: Send + Sync {
    /// Process one message. `Ok` acks; an error nacks and the transport
    /// may redeliver.
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError>;

    /// Handler name for logging and idempotency tracking.
    fn name(&self) -> &'static str;
}

/// Error returned by a bus message handler.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Dead-letter routing for messages that exhaust redelivery.
#[derive(Debug, Clone)]
pub struct DeadLetterPolicy {
    pub topic: String,
    pub max_delivery_attempts: u32,
}

/// Options for `create_subscription`.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub ack_deadline_secs: u32,
    pub max_outstanding_messages: u32,
    pub enable_message_ordering: bool,
    pub filter: Option<String>,
    pub dead_letter: Option<DeadLetterPolicy>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ack_deadline_secs: 30,
            max_outstanding_messages: 100,
            enable_message_ordering: false,
            filter: None,
            dead_letter: None,
        }
    }
}

/// Health report from the bus adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusHealth {
    Healthy,
    Unhealthy { details: String },
}

impl BusHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BusHealth::Healthy)
    }
}

/// Port for the pub/sub transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish raw bytes on a topic. Returns the transport message id.
    async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<String, BusError>;

    /// Publish a JSON value on a topic.
    async fn publish_json(
        &self,
        topic: &str,
        value: &JsonValue,
        attributes: Attributes,
    ) -> Result<String, BusError> {
        let data =
            serde_json::to_vec(value).map_err(|e| BusError::Serialization(e.to_string()))?;
        self.publish(topic, data, attributes).await
    }

    /// Create a topic. Creating an existing topic is a no-op.
    async fn create_topic(&self, topic: &str) -> Result<(), BusError>;

    /// Create a named subscription on a topic.
    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        config: SubscriptionConfig,
    ) -> Result<(), BusError>;

    /// Attach a handler to a subscription and start delivery.
    async fn subscribe(
        &self,
        subscription: &str,
        handler: Arc<dyn BusMessageHandler>,
    ) -> Result<(), BusError>;

    /// Detach the handler and stop delivery for a subscription.
    async fn unsubscribe(&self, subscription: &str) -> Result<(), BusError>;

    /// Transport reachability probe.
    async fn check_health(&self) -> BusHealth;

    /// Stop all delivery and release transport resources.
    async fn close(&self) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time checks that the traits are object-safe
    #[allow(dead_code)]
    fn assert_bus_object_safe(_: &dyn EventBus) {}

    #[allow(dead_code)]
    fn assert_handler_object_safe(_: &dyn BusMessageHandler) {}

    #[test]
    fn subscription_config_defaults() {
        let config = SubscriptionConfig::default();
        assert_eq!(config.ack_deadline_secs, 30);
        assert!(!config.enable_message_ordering);
        assert!(config.dead_letter.is_none());
    }

    #[test]
    fn bus_health_reports() {
        assert!(BusHealth::Healthy.is_healthy());
        assert!(!BusHealth::Unhealthy {
            details: "down".into()
        }
        .is_healthy());
    }
}
