//! MCP server descriptors.

use std::collections::HashMap;
use std::fmt;

/// How a server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Local child process speaking JSON-RPC over stdin/stdout.
    Stdio,
    /// Legacy HTTP+SSE transport (GET event stream, POST to the announced endpoint).
    Sse,
    /// Streamable HTTP transport (POST, JSON or SSE replies).
    StreamableHttp,
}

impl TransportKind {
    /// Parse the `type` field of a server config entry.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Some(Self::Stdio),
            "sse" => Some(Self::Sse),
            "streamable_http" | "streamable-http" | "http" => Some(Self::StreamableHttp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::StreamableHttp => write!(f, "streamable_http"),
        }
    }
}

/// Identity and connection parameters of one tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Server name (unique within a registry).
    pub name: String,
    /// Transport used to reach the server.
    pub kind: TransportKind,
    /// Command to launch (stdio).
    pub command: Option<String>,
    /// Command arguments (stdio).
    pub args: Vec<String>,
    /// Extra environment for the child process (stdio).
    pub env: HashMap<String, String>,
    /// Endpoint URL (sse, streamable_http).
    pub url: Option<String>,
    /// Extra HTTP headers (sse, streamable_http).
    pub headers: HashMap<String, String>,
    /// Whether the server is enabled.
    pub enabled: bool,
}

impl ServerDescriptor {
    /// Create a stdio server descriptor.
    pub fn stdio<S: Into<String>>(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TransportKind::Stdio,
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Create an SSE server descriptor.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::network(name, TransportKind::Sse, url)
    }

    /// Create a streamable HTTP server descriptor.
    pub fn streamable_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::network(name, TransportKind::StreamableHttp, url)
    }

    fn network(name: impl Into<String>, kind: TransportKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Add an environment variable (for stdio).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a header (for network transports).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Disable the server.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Where the server lives, for display.
    pub fn target(&self) -> String {
        match self.kind {
            TransportKind::Stdio => {
                let mut parts = vec![self.command.clone().unwrap_or_default()];
                parts.extend(self.args.iter().cloned());
                parts.join(" ")
            }
            TransportKind::Sse | TransportKind::StreamableHttp => {
                self.url.clone().unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!(TransportKind::parse("stdio"), Some(TransportKind::Stdio));
        assert_eq!(TransportKind::parse("SSE"), Some(TransportKind::Sse));
        assert_eq!(
            TransportKind::parse("streamable_http"),
            Some(TransportKind::StreamableHttp)
        );
        assert_eq!(
            TransportKind::parse("streamable-http"),
            Some(TransportKind::StreamableHttp)
        );
        assert_eq!(TransportKind::parse("http"), Some(TransportKind::StreamableHttp));
        assert_eq!(TransportKind::parse("websocket"), None);
    }

    #[test]
    fn test_stdio_descriptor() {
        let descriptor = ServerDescriptor::stdio("weather", "python", ["weather.py"])
            .with_env("API_KEY", "secret");
        assert_eq!(descriptor.kind, TransportKind::Stdio);
        assert_eq!(descriptor.command.as_deref(), Some("python"));
        assert_eq!(descriptor.args, vec!["weather.py".to_string()]);
        assert_eq!(descriptor.env.get("API_KEY").map(String::as_str), Some("secret"));
        assert!(descriptor.enabled);
        assert_eq!(descriptor.target(), "python weather.py");
    }

    #[test]
    fn test_network_descriptor() {
        let descriptor = ServerDescriptor::sse("remote", "https://example.com/sse")
            .with_header("Authorization", "Bearer token")
            .disabled();
        assert_eq!(descriptor.kind, TransportKind::Sse);
        assert_eq!(
            descriptor.headers.get("Authorization"),
            Some(&"Bearer token".to_string())
        );
        assert!(!descriptor.enabled);
        assert_eq!(descriptor.target(), "https://example.com/sse");
        assert_eq!(descriptor.kind.to_string(), "sse");
    }
}
