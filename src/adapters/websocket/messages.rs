//! WebSocket frame types for connected clients.
//!
//! Server -> client: connection ack, notification pushes, heartbeat
//! replies, errors. Client -> server: heartbeat, read acknowledgements,
//! message sends.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, MessageId};
use crate::domain::messaging::{MessageType, NotificationEvent};

// ============================================
// Server -> Client Frames
// ============================================

/// All frame types the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection established and registered.
    Connected {
        connection_id: String,
        user_id: String,
        timestamp: String,
    },

    /// A notification event addressed to this user.
    Notification {
        kind: String,
        payload: serde_json::Value,
        timestamp: String,
    },

    /// Heartbeat reply.
    Pong { timestamp: String },

    /// Request-level error (the connection stays open).
    Error { code: String, message: String },
}

impl ServerFrame {
    /// Builds the push frame for a bus event.
    ///
    /// Serialization of the payload cannot fail for well-formed events;
    /// the fallible conversion is kept so the fanout path can drop rather
    /// than panic on a pathological payload.
    pub fn notification(event: &NotificationEvent) -> Result<Self, serde_json::Error> {
        Ok(ServerFrame::Notification {
            kind: event.payload.kind().to_string(),
            payload: serde_json::to_value(&event.payload)?,
            timestamp: event.occurred_at.to_rfc3339(),
        })
    }
}

// ============================================
// Client -> Server Frames
// ============================================

/// All frame types the server accepts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat request.
    Ping,

    /// The client displayed a message; advance its status to READ.
    MarkRead {
        message_id: MessageId,
        conversation_id: ConversationId,
    },

    /// Create and deliver a new message in a conversation.
    SendMessage {
        conversation_id: ConversationId,
        #[serde(default = "default_message_type")]
        message_type: MessageType,
        content: String,
    },
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::messaging::Message;

    #[test]
    fn connected_frame_serializes_with_type_tag() {
        let frame = ServerFrame::Connected {
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
            timestamp: Timestamp::now().to_rfc3339(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""user_id":"alice""#));
    }

    #[test]
    fn notification_frame_embeds_event_kind() {
        let message = Message::new(
            ConversationId::new(),
            UserId::new("alice").unwrap(),
            "Alice",
            MessageType::Text,
            "hello",
        );
        let event =
            NotificationEvent::message_new(message, vec![UserId::new("bob").unwrap()]);
        let frame = ServerFrame::notification(&event).unwrap();

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"notification""#));
        assert!(json.contains(r#""kind":"message:new""#));
    }

    #[test]
    fn client_frame_deserializes_ping() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Ping));
    }

    #[test]
    fn client_frame_deserializes_mark_read() {
        let json = format!(
            r#"{{"type": "mark_read", "message_id": "{}", "conversation_id": "{}"}}"#,
            MessageId::new(),
            ConversationId::new()
        );
        let frame: ClientFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(frame, ClientFrame::MarkRead { .. }));
    }

    #[test]
    fn send_message_defaults_to_text() {
        let json = format!(
            r#"{{"type": "send_message", "conversation_id": "{}", "content": "hi"}}"#,
            ConversationId::new()
        );
        let frame: ClientFrame = serde_json::from_str(&json).unwrap();
        match frame {
            ClientFrame::SendMessage { message_type, .. } => {
                assert_eq!(message_type, MessageType::Text)
            }
            _ => panic!("expected send_message"),
        }
    }

    #[test]
    fn unknown_client_frame_is_rejected() {
        let result: Result<ClientFrame, _> =
            serde_json::from_str(r#"{"type": "self_destruct"}"#);
        assert!(result.is_err());
    }
}
