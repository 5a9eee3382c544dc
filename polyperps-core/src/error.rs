//! Error types for the terminal

use thiserror::Error;

/// Workspace-wide error type for market data and upstream integrations
#[derive(Error, Debug)]
pub enum PerpsError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PerpsError {
    pub fn api(msg: impl Into<String>) -> Self {
        PerpsError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        PerpsError::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        PerpsError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PerpsError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PerpsError::Internal(msg.into())
    }
}

/// Result type alias for terminal operations
pub type PerpsResult<T> = Result<T, PerpsError>;
