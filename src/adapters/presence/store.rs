//! Presence tracking backed by the document store.
//!
//! Online status lives as fields on the user document so other services
//! (and normal query paths) can read it without talking to this process.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{DocumentStore, PresenceError, PresenceTracker};

/// Collection holding user documents.
const USERS_COLLECTION: &str = "users";

/// Store-backed presence tracker.
pub struct StorePresenceTracker {
    store: Arc<dyn DocumentStore>,
}

impl StorePresenceTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn set_status(&self, user_id: &UserId, online: bool) -> Result<(), PresenceError> {
        let patch = json!({
            "online": online,
            "last_seen": Timestamp::now(),
        });
        match self
            .store
            .update(USERS_COLLECTION, user_id.as_str(), patch.clone())
            .await
        {
            Ok(()) => Ok(()),
            // First sighting of this user on this deployment.
            Err(e) if e.is_not_found() => self
                .store
                .create(USERS_COLLECTION, user_id.as_str(), patch)
                .await
                .map_err(|e| PresenceError(e.to_string())),
            Err(e) => Err(PresenceError(e.to_string())),
        }
    }
}

#[async_trait]
impl PresenceTracker for StorePresenceTracker {
    async fn set_online(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.set_status(user_id, true).await
    }

    async fn set_offline(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.set_status(user_id, false).await
    }
}
