//! Notification delivery services.

mod engine;

pub use engine::{
    NotificationEngine, CONVERSATIONS_COLLECTION, MESSAGES_COLLECTION,
    PARTICIPANTS_SUBCOLLECTION, STATUS_SUBCOLLECTION,
};
