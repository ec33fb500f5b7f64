//! MCP transport trait and the connector that opens transports.

use crate::error::McpResult;
use crate::http::{HttpConfig, HttpTransport};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::server::{ServerDescriptor, TransportKind};
use crate::sse::{SseConfig, SseTransport};
use crate::stdio::StdioTransport;
use crate::McpError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for a response.
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Send a notification (no response expected).
    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()>;

    /// Close the transport. Closing twice is a no-op.
    async fn close(&self) -> McpResult<()>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Bounded waits applied to server connections.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Transport setup plus the initialize handshake.
    pub connect: Duration,
    /// A single `tools/call` round trip.
    pub tool_call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            tool_call: Duration::from_secs(120),
        }
    }
}

/// Opens the transport for a descriptor.
///
/// The registry goes through this seam so reconnects always rebuild the
/// transport from the descriptor that was originally supplied.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh transport for the given server.
    async fn open(
        &self,
        descriptor: &ServerDescriptor,
        timeouts: &Timeouts,
    ) -> McpResult<Arc<dyn Transport>>;
}

/// Connector for real stdio, SSE and streamable HTTP servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportConnector;

#[async_trait]
impl Connector for TransportConnector {
    async fn open(
        &self,
        descriptor: &ServerDescriptor,
        timeouts: &Timeouts,
    ) -> McpResult<Arc<dyn Transport>> {
        match descriptor.kind {
            TransportKind::Stdio => {
                let command = descriptor.command.as_deref().ok_or_else(|| {
                    McpError::invalid_config(format!("{}: stdio server needs a command", descriptor.name))
                })?;
                let transport = StdioTransport::spawn(command, &descriptor.args, &descriptor.env)?;
                Ok(Arc::new(transport))
            }
            TransportKind::Sse => {
                let config = SseConfig {
                    url: required_url(descriptor)?,
                    headers: descriptor.headers.clone(),
                    timeout_secs: timeouts.tool_call.as_secs(),
                };
                let transport = SseTransport::connect(config, timeouts.connect).await?;
                Ok(Arc::new(transport))
            }
            TransportKind::StreamableHttp => {
                let config = HttpConfig {
                    url: required_url(descriptor)?,
                    headers: descriptor.headers.clone(),
                    timeout_secs: timeouts.tool_call.as_secs(),
                };
                Ok(Arc::new(HttpTransport::new(config)?))
            }
        }
    }
}

fn required_url(descriptor: &ServerDescriptor) -> McpResult<String> {
    let url = descriptor.url.as_deref().ok_or_else(|| {
        McpError::invalid_config(format!("{}: network server needs a url", descriptor.name))
    })?;
    url::Url::parse(url)
        .map_err(|e| McpError::connection_failed(format!("malformed url `{url}`: {e}")))?;
    Ok(url.to_string())
}
