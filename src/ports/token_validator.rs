//! TokenValidator port - Interface for connection token validation.
//!
//! Two implementations matter in practice: a local JWT signature check
//! used at handshake time, and a remote introspection call used by the
//! periodic re-validation sweep to catch revocation. Both satisfy the same
//! contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};

/// Identity extracted from a validated token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub display_name: Option<String>,
    /// When the presented token expires. The lifecycle manager stores this
    /// on the connection and sweeps connections past it.
    pub expires_at: Timestamp,
}

impl AuthenticatedUser {
    pub fn new(id: UserId, display_name: Option<String>, expires_at: Timestamp) -> Self {
        Self {
            id,
            display_name,
            expires_at,
        }
    }

    /// Display name with the user id as fallback.
    pub fn display_name_or_id(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Authentication errors, domain-centric rather than provider-specific.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid token")]
    InvalidToken,

    /// The token signature is valid but the token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The issuing authority reports the token revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The authority is unreachable (network, config, etc.).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Validates tokens and extracts the connecting user.
///
/// # Contract
///
/// Implementations must:
/// - Validate signature, issuer, and expiry
/// - Return `AuthError::TokenExpired` for expired-but-well-formed tokens
/// - Return `AuthError::TokenRevoked` when the authority reports
///   revocation (introspection implementations)
/// - Return `AuthError::ServiceUnavailable` for transient errors, so
///   callers can distinguish "bad token" from "can't tell right now"
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn TokenValidator) {}

    #[test]
    fn display_name_falls_back_to_id() {
        let user = AuthenticatedUser::new(
            UserId::new("user-1").unwrap(),
            None,
            Timestamp::now(),
        );
        assert_eq!(user.display_name_or_id(), "user-1");

        let named = AuthenticatedUser::new(
            UserId::new("user-1").unwrap(),
            Some("Alice".to_string()),
            Timestamp::now(),
        );
        assert_eq!(named.display_name_or_id(), "Alice");
    }
}
