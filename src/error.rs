//! Error types for the Ratio service.

use thiserror::Error;

use crate::ratelimit::{LimitError, StoreError};

/// Main error type for Ratio operations.
#[derive(Error, Debug)]
pub enum RatioError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid limit specification
    #[error("Limit error: {0}")]
    Limit(#[from] LimitError),

    /// Window store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// gRPC reflection service errors
    #[error("Reflection error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RatioError {
    fn from(err: config::ConfigError) -> Self {
        RatioError::Config(err.to_string())
    }
}

/// Result type alias for Ratio operations.
pub type Result<T> = std::result::Result<T, RatioError>;
