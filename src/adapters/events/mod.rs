//! Event bus adapters.

mod idempotent;
mod in_memory;
mod redis;

pub use self::idempotent::{IdempotentHandler, InMemoryProcessedEventStore};
pub use self::in_memory::InMemoryEventBus;
pub use self::redis::RedisEventBus;
