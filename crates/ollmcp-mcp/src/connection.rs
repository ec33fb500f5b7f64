//! A single MCP server connection.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerInfo, ToolCallResult,
};
use crate::server::ServerDescriptor;
use crate::tool::Tool;
use crate::transport::{Connector, Timeouts, Transport};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages followed per server.
const MAX_TOOL_PAGES: usize = 64;

/// A connected MCP server.
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    transport: Arc<dyn Transport>,
    server_info: Option<ServerInfo>,
    tools: Vec<Tool>,
    next_id: AtomicU64,
    /// Serializes tool calls against this server.
    call_lock: Mutex<()>,
    timeouts: Timeouts,
}

impl ServerConnection {
    /// Open the transport and perform the initialize handshake.
    pub async fn connect(
        descriptor: ServerDescriptor,
        connector: &dyn Connector,
        timeouts: Timeouts,
    ) -> McpResult<Self> {
        let name = descriptor.name.clone();
        info!(server = %name, kind = %descriptor.kind, "Connecting to MCP server");

        let attempt = async move {
            let transport = connector.open(&descriptor, &timeouts).await?;
            let mut connection = Self {
                descriptor,
                transport,
                server_info: None,
                tools: Vec::new(),
                next_id: AtomicU64::new(1),
                call_lock: Mutex::new(()),
                timeouts,
            };
            if let Err(e) = connection.handshake().await {
                connection.close().await;
                return Err(match e {
                    McpError::ProtocolError(message) => {
                        McpError::connection_failed(format!("handshake failed: {message}"))
                    }
                    other => other,
                });
            }
            Ok(connection)
        };

        let connection = tokio::time::timeout(timeouts.connect, attempt)
            .await
            .map_err(|_| McpError::Timeout)??;

        info!(server = %name, tool_count = connection.tools.len(), "Discovered MCP tools");
        Ok(connection)
    }

    async fn handshake(&mut self) -> McpResult<()> {
        let init: InitializeResult = self
            .request(
                "initialize",
                Some(serde_json::to_value(InitializeParams::default())?),
            )
            .await?;

        debug!(
            server = %self.descriptor.name,
            protocol_version = %init.protocol_version,
            server_name = %init.server_info.name,
            "MCP server initialized"
        );
        self.server_info = Some(init.server_info);

        self.transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        self.tools = self.list_tools().await?;
        Ok(())
    }

    /// Fetch the full tool catalog, following pagination cursors.
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(
                page.tools
                    .into_iter()
                    .map(|tool| Tool::from_mcp(&self.descriptor.name, tool)),
            );
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(server = %self.descriptor.name, "Tool listing truncated after too many pages");
        Ok(tools)
    }

    /// Send a request and decode its result.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response: JsonRpcResponse = self
            .transport
            .request(JsonRpcRequest::new(id, method, params))
            .await?;

        if let Some(error) = response.error {
            return Err(McpError::protocol_error(format!(
                "{method}: {} (code {})",
                error.message, error.code
            )));
        }

        let result = response
            .result
            .ok_or_else(|| McpError::protocol_error(format!("Missing {method} result")))?;
        serde_json::from_value(result).map_err(|e| McpError::protocol_error(e.to_string()))
    }

    /// Execute one tool call.
    ///
    /// Calls are serialized per connection and bounded by the tool-call
    /// timeout. A JSON-RPC error from the server becomes a `ToolError`;
    /// a result flagged `isError` is returned as-is for the caller to report.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let _guard = self.call_lock.lock().await;

        debug!(server = %self.descriptor.name, tool = tool, "Calling MCP tool");

        let params = CallToolParams {
            name: tool.to_string(),
            arguments: Some(arguments),
        };
        let params = serde_json::to_value(&params)?;
        let call = self.request::<ToolCallResult>("tools/call", Some(params));

        match tokio::time::timeout(self.timeouts.tool_call, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(McpError::ProtocolError(message))) => Err(McpError::tool_error(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(server = %self.descriptor.name, tool = tool, "Tool call timed out");
                Err(McpError::Timeout)
            }
        }
    }

    /// Tear down the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        if let Err(e) = self.transport.close().await {
            warn!(server = %self.descriptor.name, error = %e, "Error closing server connection");
        }
    }

    /// Close, then connect again with the same descriptor.
    pub async fn reload(&mut self, connector: &dyn Connector) -> McpResult<()> {
        self.close().await;
        *self = Self::connect(self.descriptor.clone(), connector, self.timeouts).await?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Tools in the order the server reported them.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
