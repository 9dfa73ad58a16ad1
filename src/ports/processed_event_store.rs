//! ProcessedEventStore port - Idempotency tracking for event handlers.
//!
//! Records which (message, handler) pairs have completed so redelivered
//! bus messages are skipped instead of reprocessed.

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;

/// Errors surfaced by the processed-event store.
#[derive(Debug, thiserror::Error)]
#[error("Processed-event store error: {0}")]
pub struct ProcessedEventError(pub String);

/// Tracks processed bus messages per handler.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Whether this handler already completed this message.
    async fn contains(
        &self,
        message_id: &str,
        handler_name: &str,
    ) -> Result<bool, ProcessedEventError>;

    /// Record successful completion.
    async fn mark_processed(
        &self,
        message_id: &str,
        handler_name: &str,
    ) -> Result<(), ProcessedEventError>;

    /// Drop entries older than the cutoff. Returns the number removed.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, ProcessedEventError>;
}
