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
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("JWT secret must be at least 32 bytes in production")]
    WeakJwtSecret,

    #[error("Heartbeat interval must be positive")]
    InvalidHeartbeatInterval,

    #[error("Heartbeat timeout factor must be at least 2")]
    InvalidTimeoutFactor,

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("Typing TTL must be positive")]
    InvalidTypingTtl,

    #[error("Sweep interval must be shorter than the typing TTL")]
    SweepIntervalTooLong,

    #[error("Invalid history base URL")]
    InvalidHistoryUrl,

    #[error("History page size must be between 1 and 200")]
    InvalidPageSize,

    #[error("Context radius must be positive")]
    InvalidContextRadius,
}
