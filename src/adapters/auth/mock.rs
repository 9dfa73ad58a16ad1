//! Mock token validator for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::ports::{AuthError, AuthenticatedUser, TokenValidator};

/// Validator with a fixed token table and explicit revocation.
pub struct MockTokenValidator {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    revoked: RwLock<HashSet<String>>,
    unavailable: RwLock<bool>,
}

impl MockTokenValidator {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
            unavailable: RwLock::new(false),
        }
    }

    /// Registers a token as valid for the given user.
    pub fn add_token(&self, token: &str, user: AuthenticatedUser) {
        self.tokens
            .write()
            .expect("MockTokenValidator: tokens lock poisoned")
            .insert(token.to_string(), user);
    }

    /// Marks a token revoked.
    pub fn revoke(&self, token: &str) {
        self.revoked
            .write()
            .expect("MockTokenValidator: revoked lock poisoned")
            .insert(token.to_string());
    }

    /// Simulates an authority outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self
            .unavailable
            .write()
            .expect("MockTokenValidator: unavailable lock poisoned") = unavailable;
    }
}

impl Default for MockTokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenValidator for MockTokenValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if *self
            .unavailable
            .read()
            .expect("MockTokenValidator: unavailable lock poisoned")
        {
            return Err(AuthError::ServiceUnavailable("mock outage".to_string()));
        }
        if self
            .revoked
            .read()
            .expect("MockTokenValidator: revoked lock poisoned")
            .contains(token)
        {
            return Err(AuthError::TokenRevoked);
        }
        self.tokens
            .read()
            .expect("MockTokenValidator: tokens lock poisoned")
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
