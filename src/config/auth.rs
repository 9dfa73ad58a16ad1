//! Authentication configuration (JWT validation + token introspection)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to validate connection tokens
    pub jwt_secret: SecretString,

    /// Expected token issuer claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// OAuth2 token introspection endpoint, used by the periodic
    /// re-validation sweep to catch revoked tokens. Optional: when unset,
    /// re-validation falls back to local signature checks only.
    pub introspection_url: Option<String>,

    /// Client id presented to the introspection endpoint
    #[serde(default)]
    pub client_id: String,

    /// Client secret presented to the introspection endpoint
    pub client_secret: Option<SecretString>,
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.jwt_secret.expose_secret().len() < 32 {
            return Err(ValidationError::JwtSecretTooShort);
        }
        if let Some(url) = &self.introspection_url {
            if *environment == Environment::Production && !url.starts_with("https://") {
                return Err(ValidationError::IntrospectionMustBeHttps);
            }
        }
        Ok(())
    }
}

fn default_issuer() -> String {
    "parley".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: SecretString::new(secret.to_string()),
            issuer: default_issuer(),
            introspection_url: None,
            client_id: String::new(),
            client_secret: None,
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = config_with_secret("too-short");
        assert!(config.validate(&Environment::Development).is_err());
    }

    #[test]
    fn test_long_secret_accepted() {
        let config = config_with_secret("0123456789abcdef0123456789abcdef");
        assert!(config.validate(&Environment::Development).is_ok());
    }

    #[test]
    fn test_plain_http_introspection_rejected_in_production() {
        let mut config = config_with_secret("0123456789abcdef0123456789abcdef");
        config.introspection_url = Some("http://auth.example.com/introspect".to_string());
        assert!(config.validate(&Environment::Production).is_err());
        assert!(config.validate(&Environment::Development).is_ok());
    }
}
