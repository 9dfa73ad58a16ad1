//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("JWT secret must be at least 32 bytes")]
    JwtSecretTooShort,

    #[error("Introspection endpoint must use HTTPS in production")]
    IntrospectionMustBeHttps,

    #[error("Topic name cannot be empty")]
    EmptyTopicName,

    #[error("Sweep interval must be non-zero")]
    InvalidSweepInterval,
}
