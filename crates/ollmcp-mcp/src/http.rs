//! Streamable HTTP transport for remote MCP servers.
//!
//! Every message is an HTTP POST. The server answers with either a JSON
//! body or an SSE stream carrying the response, and may assign a session
//! id that is echoed on later requests.

use crate::error::{McpError, McpResult};
use crate::protocol::{parse_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::sse::{header_map, map_send_error, SseEventParser};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Session id header defined by the streamable HTTP transport.
const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// The server URL (e.g., `https://mcp.example.com/mcp`)
    pub url: String,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            timeout_secs: 60,
        }
    }
}

/// Streamable HTTP transport.
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
    connected: AtomicBool,
    /// Session ID assigned by the server
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a new streamable HTTP transport.
    pub fn new(config: HttpConfig) -> McpResult<Self> {
        let client = Client::builder()
            .default_headers(header_map(&config.headers)?)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            client,
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
        })
    }

    /// Build request with common headers.
    async fn build_request(&self, body: String) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(body);

        if let Some(ref id) = *self.session_id.read().await {
            req = req.header(SESSION_HEADER, id);
        }

        req
    }

    /// Parse a JSON or SSE response body.
    async fn read_response(
        &self,
        response: reqwest::Response,
        id: u64,
    ) -> McpResult<JsonRpcResponse> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::connection_failed("server requires authentication"));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::protocol_error(format!(
                "Server returned {status}: {text}"
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = response
            .text()
            .await
            .map_err(|e| McpError::protocol_error(format!("Failed to read response: {e}")))?;

        if content_type.contains("text/event-stream") {
            find_in_event_stream(&text, id)
        } else {
            parse_response(&text)
                .map_err(|e| McpError::protocol_error(format!("Invalid JSON response: {e}")))?
                .ok_or_else(|| McpError::protocol_error("Response body is not a JSON-RPC response"))
        }
    }
}

/// Find the response for `id` among the events of an SSE body.
fn find_in_event_stream(body: &str, id: u64) -> McpResult<JsonRpcResponse> {
    let mut parser = SseEventParser::new();
    let mut events: Vec<_> = body.lines().filter_map(|line| parser.push_line(line)).collect();
    events.extend(parser.finish());

    for event in events {
        if let Ok(Some(response)) = parse_response(&event.data) {
            if response.id == id {
                return Ok(response);
            }
        }
    }

    Err(McpError::protocol_error("SSE stream ended without response"))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let id = request
            .id
            .ok_or_else(|| McpError::protocol_error("request without id"))?;
        let request_json = serde_json::to_string(&request)?;

        debug!(id = id, method = %request.method, "Sending HTTP request");

        let response = self
            .build_request(request_json)
            .await
            .send()
            .await
            .map_err(map_send_error)?;

        if let Some(session_id) = response.headers().get(SESSION_HEADER) {
            if let Ok(value) = session_id.to_str() {
                *self.session_id.write().await = Some(value.to_string());
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.read_response(response, id).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let notification_json = serde_json::to_string(&notification)?;

        debug!(method = %notification.method, "Sending HTTP notification");

        let response = self
            .build_request(notification_json)
            .await
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Notification returned non-success status");
        }

        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // Ending the session is best effort; servers may not support DELETE.
        if let Some(id) = self.session_id.write().await.take() {
            let result = self
                .client
                .delete(&self.config.url)
                .header(SESSION_HEADER, id)
                .send()
                .await;
            if let Err(e) = result {
                debug!(error = %e, "Session termination failed");
            }
        }

        debug!("Closed HTTP transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
