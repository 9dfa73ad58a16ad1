//! Message and conversation participant types.
//!
//! Messages are created outside the notification core (by the send-message
//! use case) and are read-only from the engine's perspective: a new message
//! only triggers status-record creation and an event publish.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, MessageId, Timestamp, UserId};

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    File,
}

/// A chat message as stored in the document store.
///
/// `sender_name` is denormalized onto the message so fanout payloads can be
/// rendered without a user lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Creates a new message stamped with the current time.
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: MessageId::new(),
            conversation_id,
            sender_id,
            sender_name: sender_name.into(),
            message_type,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A member of a conversation, stored in the conversation's participants
/// subcollection keyed by user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            joined_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn message_new_stamps_both_timestamps() {
        let msg = Message::new(
            ConversationId::new(),
            user("alice"),
            "Alice",
            MessageType::Text,
            "hello",
        );
        assert_eq!(msg.created_at, msg.updated_at);
    }

    #[test]
    fn message_type_uses_wire_vocabulary() {
        let json = serde_json::to_string(&MessageType::Image).unwrap();
        assert_eq!(json, "\"IMAGE\"");

        let parsed: MessageType = serde_json::from_str("\"FILE\"").unwrap();
        assert_eq!(parsed, MessageType::File);
    }

    #[test]
    fn message_serializes_type_field_name() {
        let msg = Message::new(
            ConversationId::new(),
            user("alice"),
            "Alice",
            MessageType::Text,
            "hello",
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "TEXT");
        assert_eq!(json["sender_id"], "alice");
    }
}
