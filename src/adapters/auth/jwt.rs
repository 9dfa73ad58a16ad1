//! Local JWT validation.
//!
//! Validates HS256 connection tokens at handshake time: signature, issuer
//! and expiry. Revocation cannot be seen locally; the lifecycle manager's
//! periodic sweep uses the introspection validator for that.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{AuthError, AuthenticatedUser, TokenValidator};

/// Claims parley tokens carry.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
    #[serde(default)]
    name: Option<String>,
}

/// HS256 token validator.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Creates a validator for the given shared secret and expected issuer.
    pub fn new(secret: &SecretString, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        let id = UserId::new(data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(
            id,
            data.claims.name,
            Timestamp::from_unix_secs(data.claims.exp),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
        iss: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    }

    fn secret() -> SecretString {
        SecretString::new("0123456789abcdef0123456789abcdef".to_string())
    }

    fn sign(claims: &TestClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret().expose_secret().as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> u64 {
        Timestamp::now().plus_secs(3600).as_unix_secs()
    }

    #[tokio::test]
    async fn valid_token_yields_user_and_expiry() {
        let validator = JwtValidator::new(&secret(), "parley");
        let exp = future_exp();
        let token = sign(&TestClaims {
            sub: "alice".to_string(),
            exp,
            iss: "parley".to_string(),
            name: Some("Alice".to_string()),
        });

        let user = validator.validate(&token).await.unwrap();
        assert_eq!(user.id.as_str(), "alice");
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
        assert_eq!(user.expires_at.as_unix_secs(), exp);
    }

    #[tokio::test]
    async fn expired_token_is_distinguished() {
        let validator = JwtValidator::new(&secret(), "parley");
        let token = sign(&TestClaims {
            sub: "alice".to_string(),
            exp: Timestamp::now().minus_secs(3600).as_unix_secs(),
            iss: "parley".to_string(),
            name: None,
        });

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn wrong_issuer_is_invalid() {
        let validator = JwtValidator::new(&secret(), "parley");
        let token = sign(&TestClaims {
            sub: "alice".to_string(),
            exp: future_exp(),
            iss: "someone-else".to_string(),
            name: None,
        });

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let validator = JwtValidator::new(&secret(), "parley");
        assert!(matches!(
            validator.validate("not.a.jwt").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let validator = JwtValidator::new(&secret(), "parley");
        let token = encode(
            &Header::default(),
            &TestClaims {
                sub: "alice".to_string(),
                exp: future_exp(),
                iss: "parley".to_string(),
                name: None,
            },
            &EncodingKey::from_secret(b"a-completely-different-secret-key"),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }
}
