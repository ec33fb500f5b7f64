//! In-memory MCP servers for testing.
//!
//! [`MockServer`] answers the handshake, `tools/list` and `tools/call`
//! directly, and [`MockConnector`] hands out mock servers by name so a
//! registry can be exercised without processes or sockets.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTool, ToolCallResult,
    PROTOCOL_VERSION,
};
use crate::server::ServerDescriptor;
use crate::transport::{Connector, Timeouts, Transport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted behaviour for one tool.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    ToolError(String),
    RpcError(String),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct State {
    tools: Vec<McpTool>,
    replies: HashMap<String, Reply>,
    calls: Vec<(String, Value)>,
}

/// A tool server living in memory.
#[derive(Debug)]
pub struct MockServer {
    name: String,
    state: Mutex<State>,
    connected: AtomicBool,
}

impl MockServer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(State::default()),
            connected: AtomicBool::new(true),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a tool taking an arbitrary object.
    pub fn with_tool(self: Arc<Self>, name: &str, description: &str) -> Arc<Self> {
        self.add_tool(name, description);
        self
    }

    /// Add a tool with an explicit input schema.
    pub fn with_schema_tool(self: Arc<Self>, name: &str, schema: Value) -> Arc<Self> {
        self.state().tools.push(McpTool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: Some(schema),
        });
        self
    }

    /// Answer calls to `tool` with this text.
    pub fn with_result(self: Arc<Self>, tool: &str, text: &str) -> Arc<Self> {
        self.set_reply(tool, Reply::Text(text.to_string()));
        self
    }

    /// Answer calls to `tool` with an `isError` result.
    pub fn with_tool_error(self: Arc<Self>, tool: &str, message: &str) -> Arc<Self> {
        self.set_reply(tool, Reply::ToolError(message.to_string()));
        self
    }

    /// Answer calls to `tool` with a JSON-RPC error.
    pub fn with_rpc_error(self: Arc<Self>, tool: &str, message: &str) -> Arc<Self> {
        self.set_reply(tool, Reply::RpcError(message.to_string()));
        self
    }

    /// Stall calls to `tool` before answering.
    pub fn with_delay(self: Arc<Self>, tool: &str, delay: Duration) -> Arc<Self> {
        self.set_reply(tool, Reply::Delay(delay));
        self
    }

    pub fn add_tool(&self, name: &str, description: &str) {
        self.state().tools.push(McpTool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: Some(json!({"type": "object"})),
        });
    }

    pub fn remove_tool(&self, name: &str) {
        self.state().tools.retain(|t| t.name != name);
    }

    fn set_reply(&self, tool: &str, reply: Reply) {
        self.state().replies.insert(tool.to_string(), reply);
    }

    /// Every `tools/call` received, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state().calls.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.unwrap_or_default();
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": self.name, "version": "0.0.0"}
                }),
            ),
            "tools/list" => {
                let tools = self.state().tools.clone();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = request.params.clone().unwrap_or(Value::Null);
                let tool = params["name"].as_str().unwrap_or_default().to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

                let reply = {
                    let mut state = self.state();
                    state.calls.push((tool.clone(), arguments));
                    state.replies.get(&tool).cloned()
                };

                let result = match reply {
                    Some(Reply::Text(text)) => ToolCallResult::text(text),
                    Some(Reply::ToolError(message)) => ToolCallResult {
                        is_error: true,
                        ..ToolCallResult::text(message)
                    },
                    Some(Reply::RpcError(message)) => {
                        return JsonRpcResponse::failure(id, -32000, message)
                    }
                    Some(Reply::Delay(delay)) => {
                        tokio::time::sleep(delay).await;
                        ToolCallResult::text(format!("{tool} ok"))
                    }
                    None => ToolCallResult::text(format!("{tool} ok")),
                };
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::failure(id, -32603, e.to_string()),
                }
            }
            other => JsonRpcResponse::failure(id, -32601, format!("Method not found: {other}")),
        }
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::connection_failed("Transport closed"));
        }
        Ok(self.handle(&request).await)
    }

    async fn notify(&self, _notification: JsonRpcNotification) -> McpResult<()> {
        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Connector resolving descriptors to registered mock servers by name.
#[derive(Debug, Default)]
pub struct MockConnector {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
    unreachable: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, server: Arc<MockServer>) -> Self {
        self.add_server(server);
        self
    }

    pub fn add_server(&self, server: Arc<MockServer>) {
        self.servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(server.name().to_string(), server);
    }

    /// Make connections to `name` fail until cleared.
    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        let mut list = self
            .unreachable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        list.retain(|n| n != name);
        if unreachable {
            list.push(name.to_string());
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        descriptor: &ServerDescriptor,
        _timeouts: &Timeouts,
    ) -> McpResult<Arc<dyn Transport>> {
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&descriptor.name);
        if unreachable {
            return Err(McpError::connection_failed(format!(
                "{} is unreachable",
                descriptor.name
            )));
        }

        let server = self
            .servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&descriptor.name)
            .cloned()
            .ok_or_else(|| {
                McpError::connection_failed(format!("no server named {}", descriptor.name))
            })?;
        server.connected.store(true, Ordering::SeqCst);
        Ok(server)
    }
}
