//! Adapters - Concrete implementations of the ports.

pub mod auth;
pub mod events;
pub mod http;
pub mod presence;
pub mod store;
pub mod websocket;
