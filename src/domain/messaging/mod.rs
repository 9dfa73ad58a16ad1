//! Messaging domain - messages, delivery status, and bus events.

mod delivery;
mod events;
mod message;

pub use delivery::{DeliveryRecord, DeliveryState};
pub use events::{EventId, NotificationEvent, NotificationPayload};
pub use message::{Message, MessageType, Participant};
