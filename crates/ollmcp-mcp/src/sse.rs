//! SSE (Server-Sent Events) transport for remote MCP servers.
//!
//! This is the HTTP+SSE transport:
//! - a long-lived GET opens the event stream
//! - the first `endpoint` event names the URL that accepts POSTed messages
//! - responses arrive on the stream as `message` events

use crate::error::{McpError, McpResult};
use crate::protocol::{parse_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{debug, trace, warn};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`message` when the server sent none).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Incremental parser for `text/event-stream` lines.
#[derive(Debug, Default)]
pub struct SseEventParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). Returns an event when a blank
    /// line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Flush a trailing event when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// SSE transport configuration.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// The event stream URL (e.g., `https://mcp.example.com/sse`)
    pub url: String,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            timeout_secs: 60,
        }
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;
type Pending = Arc<std::sync::Mutex<PendingMap>>;

fn lock_pending(pending: &Pending) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns one request's slot in the pending map and frees it on drop, so a
/// request abandoned mid-flight leaves nothing behind.
struct PendingSlot<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// SSE transport for remote MCP servers.
pub struct SseTransport {
    config: SseConfig,
    client: Client,
    endpoint: String,
    connected: Arc<AtomicBool>,
    pending: Pending,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its
    /// message endpoint.
    pub async fn connect(config: SseConfig, connect_timeout: Duration) -> McpResult<Self> {
        let client = Client::builder()
            .default_headers(header_map(&config.headers)?)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        debug!(url = %config.url, "Opening SSE stream");

        let response = client
            .get(&config.url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::connection_failed("server requires authentication"));
        }
        if !status.is_success() {
            return Err(McpError::connection_failed(format!(
                "SSE stream returned {status}"
            )));
        }

        let pending: Pending = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = tokio::spawn(read_events(
            response,
            endpoint_tx,
            pending.clone(),
            connected.clone(),
        ));

        let endpoint = match tokio::time::timeout(connect_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::connection_failed(
                    "SSE stream ended before announcing an endpoint",
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Timeout);
            }
        };

        let endpoint = resolve_endpoint(&config.url, &endpoint)?;
        debug!(endpoint = %endpoint, "SSE endpoint announced");

        Ok(Self {
            config,
            client,
            endpoint,
            connected,
            pending,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// The URL requests are POSTed to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Requests still waiting for their reply on the stream.
    pub fn pending_requests(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    async fn post(&self, body: String) -> McpResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::protocol_error(format!(
                "Server returned {status}: {text}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::connection_failed("Transport closed"));
        }
        let id = request
            .id
            .ok_or_else(|| McpError::protocol_error("request without id"))?;

        let body = serde_json::to_string(&request)?;
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        debug!(id = id, method = %request.method, "Sending SSE request");

        self.post(body).await?;

        let wait = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::connection_failed("SSE stream closed")),
            Err(_) => Err(McpError::Timeout),
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        debug!(method = %notification.method, "Sending SSE notification");
        self.post(serde_json::to_string(&notification)?).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        // Dropping the senders fails any waiting request.
        lock_pending(&self.pending).clear();
        debug!("Closed SSE transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.reader.try_lock() {
            if let Some(reader) = guard.take() {
                reader.abort();
            }
        }
    }
}

/// Background reader: routes `endpoint` and `message` events.
async fn read_events(
    response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    pending: Pending,
    connected: Arc<AtomicBool>,
) {
    let reader = StreamReader::new(
        response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other)),
    );
    let mut lines = reader.lines();
    let mut parser = SseEventParser::new();
    let mut endpoint_tx = Some(endpoint_tx);

    loop {
        let event = match lines.next_line().await {
            Ok(Some(line)) => match parser.push_line(&line) {
                Some(event) => event,
                None => continue,
            },
            Ok(None) => match parser.finish() {
                Some(event) => event,
                None => break,
            },
            Err(e) => {
                warn!(error = %e, "SSE stream error");
                break;
            }
        };

        trace!(event = %event.event, data = %event.data, "SSE event");

        match event.event.as_str() {
            "endpoint" => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(event.data.trim().to_string());
                }
            }
            "message" => match parse_response(&event.data) {
                Ok(Some(response)) => {
                    let waiter = lock_pending(&pending).remove(&response.id);
                    if let Some(tx) = waiter {
                        let _ = tx.send(response);
                    } else {
                        debug!(id = response.id, "Response for unknown request");
                    }
                }
                Ok(None) => debug!("Skipping server-initiated message"),
                Err(e) => debug!(error = %e, "Invalid SSE message payload"),
            },
            other => debug!(event = other, "Ignoring SSE event"),
        }
    }

    connected.store(false, Ordering::SeqCst);
    lock_pending(&pending).clear();
    debug!("SSE stream ended");
}

fn resolve_endpoint(base: &str, endpoint: &str) -> McpResult<String> {
    let base = url::Url::parse(base)
        .map_err(|e| McpError::connection_failed(format!("malformed url `{base}`: {e}")))?;
    base.join(endpoint)
        .map(|url| url.to_string())
        .map_err(|e| McpError::protocol_error(format!("invalid endpoint `{endpoint}`: {e}")))
}

/// Build a header map from configured headers.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> McpResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::invalid_config(format!("bad header name `{key}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpError::invalid_config(format!("bad header value for `{key}`: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Classify a reqwest send failure.
pub(crate) fn map_send_error(e: reqwest::Error) -> McpError {
    if e.is_timeout() {
        McpError::Timeout
    } else if e.is_connect() {
        McpError::connection_failed(format!("Connection failed: {e}"))
    } else {
        McpError::protocol_error(format!("Request failed: {e}"))
    }
}
