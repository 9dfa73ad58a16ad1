//! Notification events carried on the event bus.
//!
//! Every chat event crosses the bus as a `NotificationEvent`: a tagged
//! payload plus the explicit recipient list and a publisher-assigned event
//! id used for deduplication under at-least-once delivery. Payload kinds
//! are a closed sum type; unknown kinds fail deserialization and are
//! dropped by the subscriber instead of being passed through untyped.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::foundation::{ConversationId, MessageId, Timestamp, UserId};
use crate::domain::messaging::{DeliveryState, Message};

/// Unique identifier for a bus event instance (deduplication key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminated event payload. The `kind` tag is the routing vocabulary
/// shared with every other process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NotificationPayload {
    /// A message was created; recipients should render it and the local
    /// fanout should mark it DELIVERED for recipients it reaches.
    #[serde(rename = "message:new")]
    MessageNew {
        message: Message,
        conversation_id: ConversationId,
    },

    /// A recipient's delivery status changed (currently: read receipts).
    #[serde(rename = "message:status")]
    MessageStatus {
        message_id: MessageId,
        conversation_id: ConversationId,
        user_id: UserId,
        status: DeliveryState,
        occurred_at: Timestamp,
    },
}

impl NotificationPayload {
    /// The wire tag for this payload, used in bus attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::MessageNew { .. } => "message:new",
            NotificationPayload::MessageStatus { .. } => "message:status",
        }
    }

    /// The conversation the event belongs to.
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            NotificationPayload::MessageNew { conversation_id, .. } => *conversation_id,
            NotificationPayload::MessageStatus { conversation_id, .. } => *conversation_id,
        }
    }
}

/// Transport envelope for a notification event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_id: EventId,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    pub recipients: Vec<UserId>,
    /// Publish time. Named `timestamp` on the wire to keep it distinct
    /// from the status payload's own `occurred_at`.
    #[serde(rename = "timestamp")]
    pub occurred_at: Timestamp,
}

impl NotificationEvent {
    /// Builds a `message:new` event for the given recipients.
    pub fn message_new(message: Message, recipients: Vec<UserId>) -> Self {
        let conversation_id = message.conversation_id;
        Self {
            event_id: EventId::new(),
            payload: NotificationPayload::MessageNew {
                message,
                conversation_id,
            },
            recipients,
            occurred_at: Timestamp::now(),
        }
    }

    /// Builds a `message:status` event addressed to the original sender.
    pub fn message_status(
        message_id: MessageId,
        conversation_id: ConversationId,
        user_id: UserId,
        status: DeliveryState,
        sender: UserId,
    ) -> Self {
        let occurred_at = Timestamp::now();
        Self {
            event_id: EventId::new(),
            payload: NotificationPayload::MessageStatus {
                message_id,
                conversation_id,
                user_id,
                status,
                occurred_at,
            },
            recipients: vec![sender],
            occurred_at,
        }
    }

    /// Serializes the event for the bus.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an event from raw bus bytes. Malformed payloads and unknown
    /// kinds are errors; the subscriber logs and drops them.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
