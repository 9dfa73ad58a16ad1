//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the core and the outside world. Adapters implement these ports.
//!
//! - `DocumentStore` - document database CRUD/query/batch/transactions
//! - `EventBus` - pub/sub transport with at-least-once delivery
//! - `BusMessageHandler` - handler invoked per delivered bus message
//! - `ProcessedEventStore` - idempotency tracking for event handlers
//! - `ClientTransport` - live channel to one connected client
//! - `TokenValidator` - connection token validation / introspection
//! - `PresenceTracker` - online-status coordination

mod document_store;
mod event_bus;
mod presence;
mod processed_event_store;
mod token_validator;
mod transport;

pub use document_store::{
    subcollection_path, Document, DocumentStore, FieldFilter, FilterOp, OrderBy, Page, Query,
    StoreError, StoreTransaction, TransactionFn, WriteOp,
};
pub use event_bus::{
    Attributes, BusError, BusHealth, BusMessage, BusMessageHandler, DeadLetterPolicy, EventBus,
    HandlerError, SubscriptionConfig,
};
pub use presence::{PresenceError, PresenceTracker};
pub use processed_event_store::{ProcessedEventError, ProcessedEventStore};
pub use token_validator::{AuthError, AuthenticatedUser, TokenValidator};
pub use transport::{close_codes, ClientTransport, TransportError};
