//! ClientTransport port - Interface for a live bidirectional channel.
//!
//! The WebSocket adapter implements this over an outbound frame queue; the
//! fanout and lifecycle code only ever see the trait, which keeps them
//! testable with recording fakes.

use async_trait::async_trait;

/// Close codes used when the server terminates a connection.
///
/// Values live in the 4000+ application range of the WebSocket close-code
/// space so clients can distinguish policy closes from protocol closes.
pub mod close_codes {
    /// The connection's token passed its expiry.
    pub const TOKEN_EXPIRED: u16 = 4401;
    /// The issuing authority reported the token revoked.
    pub const TOKEN_REVOKED: u16 = 4403;
    /// An administrator force-disconnected the connection.
    pub const FORCED: u16 = 4410;
    /// The server is shutting down.
    pub const SHUTDOWN: u16 = 4412;
}

/// Errors surfaced by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer is gone or the outbound queue is closed.
    #[error("Connection closed")]
    Closed,

    /// The frame could not be handed to the transport.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// A live channel to one connected client.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Queue a text frame for the client.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Close the channel with a code and human-readable reason.
    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn ClientTransport) {}

    #[test]
    fn close_codes_are_distinct() {
        let codes = [
            close_codes::TOKEN_EXPIRED,
            close_codes::TOKEN_REVOKED,
            close_codes::FORCED,
            close_codes::SHUTDOWN,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
