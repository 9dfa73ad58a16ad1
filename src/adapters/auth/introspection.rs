//! OAuth2 token introspection (RFC 7662).
//!
//! Used by the periodic re-validation sweep: unlike the local JWT check,
//! the authority's introspection endpoint can see revocation. Network
//! failures map to `ServiceUnavailable` so the sweep can distinguish
//! "revoked" from "can't tell right now" and avoid kicking users during
//! an authority outage.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{AuthError, AuthenticatedUser, TokenValidator};

/// RFC 7662 introspection response, reduced to the claims we use.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    username: Option<String>,
}

/// Validator backed by the authority's introspection endpoint.
pub struct IntrospectionValidator {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: Option<SecretString>,
}

impl IntrospectionValidator {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<SecretString>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }
}

#[async_trait]
impl TokenValidator for IntrospectionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let mut form = vec![
            ("token", token.to_string()),
            ("client_id", self.client_id.clone()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret().clone()));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ServiceUnavailable(format!(
                "introspection returned {}",
                response.status()
            )));
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ServiceUnavailable(e.to_string()))?;

        if !body.active {
            return Err(AuthError::TokenRevoked);
        }

        let sub = body.sub.ok_or(AuthError::InvalidToken)?;
        let id = UserId::new(sub).map_err(|_| AuthError::InvalidToken)?;
        let expires_at = body
            .exp
            .map(Timestamp::from_unix_secs)
            .unwrap_or_else(|| Timestamp::now().plus_secs(300));

        Ok(AuthenticatedUser::new(id, body.username, expires_at))
    }
}
