//! Fanout bridge connecting bus events to local WebSocket connections.
//!
//! Runs on every process, fed by that process's bus subscription. For each
//! recipient of an event it looks up locally-registered connections and
//! pushes the frame to each one; recipients without local connections are
//! skipped (another instance holds their sockets).
//!
//! # Event Flow
//!
//! ```text
//! bus delivery -> parse NotificationEvent
//!              -> per recipient: registry lookup
//!              -> send frame to every local connection (isolated)
//!              -> message:new only: advance status to DELIVERED
//! ```
//!
//! # Failure semantics
//!
//! - Malformed payloads are logged and dropped; the handler acks so the
//!   transport does not redeliver garbage.
//! - A send failure on one connection never blocks the others; sends are
//!   issued concurrently per recipient.
//! - The DELIVERED status write is best-effort: the client already has
//!   the message, so store failures here are logged and swallowed.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::domain::foundation::{MessageId, Timestamp, UserId};
use crate::domain::messaging::{DeliveryRecord, DeliveryState, NotificationEvent, NotificationPayload};
use crate::ports::{
    subcollection_path, BusMessage, BusMessageHandler, DocumentStore, HandlerError, StoreError,
};

use super::messages::ServerFrame;
use super::registry::ConnectionRegistry;
use crate::application::notifications::{MESSAGES_COLLECTION, STATUS_SUBCOLLECTION};

/// Bus handler performing local fanout and DELIVERED tracking.
pub struct FanoutHandler {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn DocumentStore>,
}

impl FanoutHandler {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self { registry, store }
    }

    /// Create as an Arc (for handing to the bus subscription).
    pub fn new_shared(registry: Arc<ConnectionRegistry>, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self::new(registry, store))
    }

    /// Delivers the frame to every local connection of one recipient.
    /// Returns true if at least one connection accepted it.
    async fn deliver_to(&self, recipient: &UserId, frame: &str) -> bool {
        let connections = self.registry.connections_for(recipient).await;
        if connections.is_empty() {
            return false;
        }

        let sends = connections
            .iter()
            .map(|connection| connection.transport().send(frame));
        let results = join_all(sends).await;

        let mut delivered = false;
        for (connection, result) in connections.iter().zip(results) {
            match result {
                Ok(()) => delivered = true,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        user_id = %recipient,
                        error = %e,
                        "Send failed on one connection"
                    );
                }
            }
        }
        delivered
    }

    /// Best-effort DELIVERED transition after a successful local send.
    async fn mark_delivered(&self, message_id: MessageId, recipient: &UserId) {
        if let Err(e) = self.advance_to_delivered(message_id, recipient).await {
            tracing::warn!(
                message_id = %message_id,
                user_id = %recipient,
                error = %e,
                "DELIVERED status update failed (message already delivered to client)"
            );
        }
    }

    async fn advance_to_delivered(
        &self,
        message_id: MessageId,
        recipient: &UserId,
    ) -> Result<(), StoreError> {
        let collection =
            subcollection_path(MESSAGES_COLLECTION, &message_id.to_string(), STATUS_SUBCOLLECTION);
        let now = Timestamp::now();

        let record = match self.store.find_by_id(&collection, recipient.as_str()).await? {
            Some(doc) => {
                let mut record: DeliveryRecord = serde_json::from_value(doc.data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                // Rank-forward: a READ recorded meanwhile wins over this write.
                if !record.advance(DeliveryState::Delivered, now) {
                    return Ok(());
                }
                record
            }
            // Record missing: the fanout on this instance outran the batch
            // write, or it failed. Upsert directly in DELIVERED.
            None => {
                let mut record = DeliveryRecord::sent(recipient.clone(), now);
                record.advance(DeliveryState::Delivered, now);
                record
            }
        };

        let data = serde_json::to_value(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.create(&collection, recipient.as_str(), data).await
    }
}

#[async_trait]
impl BusMessageHandler for FanoutHandler {
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError> {
        let event = match NotificationEvent::from_bytes(&message.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Dropping malformed bus payload"
                );
                return Ok(());
            }
        };

        let frame = match ServerFrame::notification(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "Dropping unframeable event");
                return Ok(());
            }
        };
        let frame = match serde_json::to_string(&frame) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "Dropping unserializable frame");
                return Ok(());
            }
        };

        for recipient in &event.recipients {
            let delivered = self.deliver_to(recipient, &frame).await;
            if !delivered {
                continue;
            }
            if let NotificationPayload::MessageNew { message, .. } = &event.payload {
                self.mark_delivered(message.id, recipient).await;
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "FanoutHandler"
    }
}
