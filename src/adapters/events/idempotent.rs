//! IdempotentHandler - wrapper ensuring at-most-once event processing.
//!
//! The bus delivers at least once, so every handler must tolerate
//! duplicates. Fanout sends are naturally harmless to repeat, but wrapping
//! the handler in `IdempotentHandler` skips duplicate bus messages
//! entirely using a `ProcessedEventStore`.
//!
//! A message is only marked processed after the inner handler succeeds;
//! failures leave it unmarked so the transport can redeliver and retry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    BusMessage, BusMessageHandler, HandlerError, ProcessedEventError, ProcessedEventStore,
};

/// Decorates any `BusMessageHandler` with idempotency tracking keyed on
/// (message id, handler name).
pub struct IdempotentHandler<H: BusMessageHandler> {
    inner: H,
    processed: Arc<dyn ProcessedEventStore>,
}

impl<H: BusMessageHandler> IdempotentHandler<H> {
    /// Create a new IdempotentHandler wrapping the given handler.
    pub fn new(inner: H, processed: Arc<dyn ProcessedEventStore>) -> Self {
        Self { inner, processed }
    }
}

#[async_trait]
impl<H: BusMessageHandler + 'static> BusMessageHandler for IdempotentHandler<H> {
    async fn handle(&self, message: BusMessage) -> Result<(), HandlerError> {
        let handler_name = self.inner.name();

        let seen = self
            .processed
            .contains(&message.message_id, handler_name)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        if seen {
            tracing::debug!(
                message_id = %message.message_id,
                handler = handler_name,
                "Skipping duplicate bus message"
            );
            return Ok(());
        }

        let message_id = message.message_id.clone();
        self.inner.handle(message).await?;

        // Mark only after successful handling so failures stay retryable.
        self.processed
            .mark_processed(&message_id, handler_name)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Process-local processed-event store.
///
/// Sufficient for deduplicating redeliveries within one process lifetime;
/// a shared store behind the same port extends that across restarts.
pub struct InMemoryProcessedEventStore {
    entries: RwLock<HashMap<(String, String), Timestamp>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryProcessedEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn contains(
        &self,
        message_id: &str,
        handler_name: &str,
    ) -> Result<bool, ProcessedEventError> {
        let key = (message_id.to_string(), handler_name.to_string());
        Ok(self.entries.read().await.contains_key(&key))
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        handler_name: &str,
    ) -> Result<(), ProcessedEventError> {
        let key = (message_id.to_string(), handler_name.to_string());
        self.entries.write().await.insert(key, Timestamp::now());
        Ok(())
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, ProcessedEventError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, at| !at.is_before(&cutoff));
        Ok((before - entries.len()) as u64)
    }
}
