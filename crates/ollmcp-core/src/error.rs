//! Error types for the core crate.

use std::time::Duration;
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Model provider error.
    #[error("model error: {0}")]
    Provider(#[from] ollmcp_provider::ProviderError),

    /// MCP error.
    #[error("mcp error: {0}")]
    Mcp(#[from] ollmcp_mcp::McpError),

    /// A model round trip or tool call ran past its deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The turn was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON syntax or shape.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Invalid path (e.g., could not determine config directory).
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CoreError::Timeout {
            operation: "model request",
            after: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "model request timed out after 120s");

        let err: CoreError = ConfigError::validation("too many stop sequences").into();
        assert_eq!(
            err.to_string(),
            "config error: config validation failed: too many stop sequences"
        );
    }
}
