//! Notification engine - the message delivery state machine.
//!
//! Owns the lifecycle of delivery for every new message: computes the
//! recipient set, writes per-recipient SENT status records, and publishes
//! the event onto the bus. Publishing goes through the bus even for
//! recipients connected to this same process: that is what guarantees
//! every instance (including ones holding none of the originating user's
//! sockets) observes the event in a multi-instance deployment.
//!
//! Also owns the READ transition: read receipts update the status record
//! directly and publish a status event addressed to the message's sender.
//!
//! # Failure semantics
//!
//! Store and bus failures in these methods are primary-path failures and
//! propagate to the caller; the message-creation flow decides whether to
//! retry or fail the user-facing request. A failed publish degrades to
//! "eventually visible via poll/refresh": the message document is already
//! persisted and retrievable.

use std::sync::Arc;

use crate::domain::foundation::{
    ConversationId, DomainError, MessageId, Timestamp, UserId,
};
use crate::domain::messaging::{
    DeliveryRecord, DeliveryState, Message, NotificationEvent, Participant,
};
use crate::ports::{
    subcollection_path, Attributes, DocumentStore, EventBus, Query, StoreError, WriteOp,
};

/// Top-level collection of conversation documents.
pub const CONVERSATIONS_COLLECTION: &str = "conversations";
/// Top-level collection of message documents.
pub const MESSAGES_COLLECTION: &str = "messages";
/// Subcollection of a conversation holding its participants.
pub const PARTICIPANTS_SUBCOLLECTION: &str = "participants";
/// Subcollection of a message holding per-recipient delivery status.
pub const STATUS_SUBCOLLECTION: &str = "status";

/// Orchestrates delivery status and event publication.
pub struct NotificationEngine {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn DocumentStore>, bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
        }
    }

    /// Handles a newly created message.
    ///
    /// Fetches the conversation's participants, computes recipients
    /// (participants minus the sender), batch-creates their SENT status
    /// records and publishes a `message:new` event. A conversation with no
    /// recipients is a no-op: no batch write, no publish.
    pub async fn handle_new_message(&self, message: &Message) -> Result<(), DomainError> {
        let conversation_id = message.conversation_id;
        let participants = self
            .store
            .find_in_subcollection(
                CONVERSATIONS_COLLECTION,
                &conversation_id.to_string(),
                PARTICIPANTS_SUBCOLLECTION,
                Query::all(),
            )
            .await?;

        let mut recipients: Vec<UserId> = Vec::with_capacity(participants.len());
        for doc in participants {
            let participant: Participant = serde_json::from_value(doc.data)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if participant.user_id != message.sender_id {
                recipients.push(participant.user_id);
            }
        }

        if recipients.is_empty() {
            tracing::debug!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                "No recipients, skipping status writes and publish"
            );
            return Ok(());
        }

        let now = Timestamp::now();
        let status_collection = subcollection_path(
            MESSAGES_COLLECTION,
            &message.id.to_string(),
            STATUS_SUBCOLLECTION,
        );
        let ops = recipients
            .iter()
            .map(|recipient| {
                let record = DeliveryRecord::sent(recipient.clone(), now);
                Ok(WriteOp::Create {
                    collection: status_collection.clone(),
                    id: recipient.as_str().to_string(),
                    data: serde_json::to_value(&record)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.store.batch_write(ops).await?;

        let event = NotificationEvent::message_new(message.clone(), recipients);
        let mut attributes = Attributes::new();
        attributes.insert("kind".to_string(), event.payload.kind().to_string());
        attributes.insert("conversation_id".to_string(), conversation_id.to_string());
        attributes.insert("sender_id".to_string(), message.sender_id.to_string());

        let data = event
            .to_bytes()
            .map_err(|e| DomainError::new(crate::domain::foundation::ErrorCode::InternalError, e.to_string()))?;
        self.bus.publish(&self.topic, data, attributes).await?;

        tracing::debug!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            "Published message:new"
        );
        Ok(())
    }

    /// Records a read receipt and notifies the sender.
    ///
    /// The status record advances rank-forward to READ; if no record
    /// exists yet (read receipt racing the fanout) one is created directly
    /// in READ state with a synthesized `sent_at`. A repeated receipt for
    /// an already-READ record is an idempotent no-op and publishes
    /// nothing. If the message itself cannot be found the receipt is
    /// silently dropped: there is nobody to notify.
    pub async fn mark_as_read(
        &self,
        message_id: MessageId,
        conversation_id: ConversationId,
        reader: &UserId,
    ) -> Result<(), DomainError> {
        let now = Timestamp::now();
        let status_collection = subcollection_path(
            MESSAGES_COLLECTION,
            &message_id.to_string(),
            STATUS_SUBCOLLECTION,
        );

        let record = match self.store.find_by_id(&status_collection, reader.as_str()).await? {
            Some(doc) => {
                let mut record: DeliveryRecord = serde_json::from_value(doc.data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if !record.advance(DeliveryState::Read, now) {
                    // Already READ: duplicate receipt, nothing to announce.
                    return Ok(());
                }
                record
            }
            None => DeliveryRecord::read_directly(reader.clone(), now),
        };
        let data = serde_json::to_value(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .create(&status_collection, reader.as_str(), data)
            .await?;

        let Some(message_doc) = self
            .store
            .find_by_id(MESSAGES_COLLECTION, &message_id.to_string())
            .await?
        else {
            tracing::debug!(
                message_id = %message_id,
                "Read receipt for unknown message, skipping publish"
            );
            return Ok(());
        };
        let message: Message = serde_json::from_value(message_doc.data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let event = NotificationEvent::message_status(
            message_id,
            conversation_id,
            reader.clone(),
            DeliveryState::Read,
            message.sender_id.clone(),
        );
        let mut attributes = Attributes::new();
        attributes.insert("kind".to_string(), event.payload.kind().to_string());
        attributes.insert("conversation_id".to_string(), conversation_id.to_string());
        attributes.insert("user_id".to_string(), reader.to_string());

        let data = event
            .to_bytes()
            .map_err(|e| DomainError::new(crate::domain::foundation::ErrorCode::InternalError, e.to_string()))?;
        self.bus.publish(&self.topic, data, attributes).await?;

        Ok(())
    }
}
