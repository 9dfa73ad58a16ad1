//! Presence adapters.

mod store;

pub use self::store::StorePresenceTracker;
