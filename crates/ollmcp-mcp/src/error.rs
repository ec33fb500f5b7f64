//! MCP error types.

use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Server not found.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// Tool not found on the named server.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A server with this name is already registered.
    #[error("Duplicate server: {0}")]
    DuplicateServer(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server process failed.
    #[error("Server process error: {0}")]
    ProcessError(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Tool execution failed.
    #[error("Tool execution failed: {0}")]
    ToolError(String),

    /// Tool arguments do not match the tool's input schema.
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    /// Malformed server configuration.
    #[error("Invalid server config: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server timeout.
    #[error("Server timeout")]
    Timeout,
}

impl McpError {
    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Create a tool error.
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self::ToolError(message.into())
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error came from a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        match self {
            McpError::Timeout => true,
            McpError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                McpError::ServerNotFound("test".to_string()),
                "Server not found: test",
            ),
            (
                McpError::ToolNotFound("weather.forecast".to_string()),
                "Tool not found: weather.forecast",
            ),
            (
                McpError::DuplicateServer("weather".to_string()),
                "Duplicate server: weather",
            ),
            (
                McpError::ConnectionFailed("refused".to_string()),
                "Connection failed: refused",
            ),
            (
                McpError::ProcessError("exit 1".to_string()),
                "Server process error: exit 1",
            ),
            (
                McpError::ProtocolError("invalid".to_string()),
                "Protocol error: invalid",
            ),
            (
                McpError::ToolError("failed".to_string()),
                "Tool execution failed: failed",
            ),
            (
                McpError::InvalidArguments {
                    tool: "weather.forecast".to_string(),
                    message: "missing city".to_string(),
                },
                "Invalid arguments for weather.forecast: missing city",
            ),
            (
                McpError::InvalidConfig("no command".to_string()),
                "Invalid server config: no command",
            ),
            (McpError::Timeout, "Server timeout"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_constructors() {
        let conn_err = McpError::connection_failed("failed to connect");
        assert!(conn_err.to_string().contains("Connection failed"));

        let proto_err = McpError::protocol_error("invalid message");
        assert!(proto_err.to_string().contains("Protocol error"));

        let tool_err = McpError::tool_error("execution failed");
        assert!(tool_err.to_string().contains("Tool execution failed"));
    }

    #[test]
    fn test_is_timeout() {
        assert!(McpError::Timeout.is_timeout());
        assert!(!McpError::tool_error("boom").is_timeout());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let mcp_err: McpError = io_err.into();
        assert!(mcp_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(mcp_err.to_string().contains("JSON error"));
    }
}
