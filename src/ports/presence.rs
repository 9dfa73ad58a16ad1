//! PresenceTracker port - Interface for online-status coordination.
//!
//! The lifecycle manager marks a user online when their first connection
//! registers and offline when their last one goes away. Presence is a
//! best-effort concern: failures are logged by the caller, never allowed
//! to fail a connection.

use async_trait::async_trait;

use crate::domain::foundation::UserId;

/// Errors surfaced by presence operations.
#[derive(Debug, thiserror::Error)]
#[error("Presence backend error: {0}")]
pub struct PresenceError(pub String);

/// Tracks which users are currently online.
#[async_trait]
pub trait PresenceTracker: Send + Sync {
    async fn set_online(&self, user_id: &UserId) -> Result<(), PresenceError>;
    async fn set_offline(&self, user_id: &UserId) -> Result<(), PresenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn PresenceTracker) {}
}
