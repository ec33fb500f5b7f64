//! Ollama provider implementation.
//!
//! Talks to the native `/api/chat` endpoint, which streams one JSON object
//! per line, and lists local models through `/api/tags`.

use crate::{
    error::ProviderError, message::ContentPart, message::Message, message::Role,
    options::ModelOptions, stream::Metrics, stream::StreamChunk, GenerateOptions, LanguageModel,
    ProviderResult, ToolDefinition,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model families that accept the `think` flag.
const THINKING_MODELS: &[&str] = &["deepseek-r1", "qwen3"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether `model` accepts the thinking flag. Only the base name before
/// the `:` tag is considered.
pub fn supports_thinking(model: &str) -> bool {
    let base = model.split(':').next().unwrap_or(model);
    THINKING_MODELS.contains(&base)
}

/// Ollama provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    next_call_id: Arc<AtomicU64>,
}

impl OllamaProvider {
    /// Create a provider for the Ollama server at `host`.
    pub fn new(host: &str) -> ProviderResult<Self> {
        let base_url = url::Url::parse(host)?;
        debug!(host = %base_url, "Creating Ollama provider");

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            next_call_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    /// Verify the server answers at all.
    pub async fn check_connection(&self) -> ProviderResult<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::api_error(
                response.status().as_u16(),
                "Ollama did not answer /api/tags",
            ));
        }
        Ok(())
    }

    /// Parse the NDJSON body into chunks.
    fn parse_stream(
        &self,
        response: reqwest::Response,
        abort: Option<tokio_util::sync::CancellationToken>,
    ) -> BoxStream<'static, ProviderResult<StreamChunk>> {
        let next_call_id = self.next_call_id.clone();

        Box::pin(try_stream! {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            loop {
                let next = match &abort {
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => Err(ProviderError::Cancelled),
                        next = stream.next() => Ok(next),
                    },
                    None => Ok(stream.next().await),
                };
                let Some(chunk) = next? else { break };
                let chunk = chunk.map_err(ProviderError::RequestFailed)?;
                buffer.extend_from_slice(&chunk);

                while let Some(line) = extract_line(&mut buffer) {
                    for item in parse_line(&line, &next_call_id)? {
                        finished |= matches!(item, StreamChunk::Finish { .. });
                        yield item;
                    }
                }
            }

            let rest = String::from_utf8_lossy(&buffer).into_owned();
            for item in parse_line(&rest, &next_call_id)? {
                finished |= matches!(item, StreamChunk::Finish { .. });
                yield item;
            }

            if !finished {
                Err(ProviderError::StreamInterrupted)?;
            }
        })
    }
}

/// Take one complete line off the front of the buffer.
fn extract_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Parse one NDJSON line into zero or more chunks.
fn parse_line(line: &str, next_call_id: &AtomicU64) -> ProviderResult<Vec<StreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| ProviderError::invalid_response(format!("malformed chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(ProviderError::invalid_response(error));
    }

    let mut out = Vec::new();
    if let Some(message) = chunk.message {
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            out.push(StreamChunk::ReasoningDelta(thinking));
        }
        if !message.content.is_empty() {
            out.push(StreamChunk::TextDelta(message.content));
        }
        for call in message.tool_calls {
            let id = format!("call_{}", next_call_id.fetch_add(1, Ordering::SeqCst));
            out.push(StreamChunk::ToolCall {
                id,
                name: call.function.name,
                arguments: normalize_arguments(call.function.arguments),
            });
        }
    }
    if chunk.done {
        out.push(StreamChunk::Finish {
            metrics: chunk.metrics,
        });
    }
    Ok(out)
}

/// Some models send arguments as a JSON string instead of an object.
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => json!({}),
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Convert messages to Ollama chat format.
fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<Value> {
    let mut converted = Vec::new();

    if let Some(system) = system.filter(|s| !s.is_empty()) {
        converted.push(json!({ "role": "system", "content": system }));
    }

    for msg in messages {
        match msg.role {
            Role::System => converted.push(json!({ "role": "system", "content": msg.text() })),
            Role::User => converted.push(json!({ "role": "user", "content": msg.text() })),
            Role::Assistant => {
                let mut entry = json!({ "role": "assistant", "content": msg.text() });
                let calls: Vec<Value> = msg
                    .tool_calls()
                    .map(|(_, name, arguments)| {
                        json!({ "function": { "name": name, "arguments": arguments } })
                    })
                    .collect();
                if !calls.is_empty() {
                    entry["tool_calls"] = Value::Array(calls);
                }
                converted.push(entry);
            }
            Role::Tool => {
                for part in &msg.content {
                    if let ContentPart::ToolResult { name, content, .. } = part {
                        converted.push(json!({
                            "role": "tool",
                            "content": content,
                            "tool_name": name
                        }));
                    }
                }
            }
        }
    }

    converted
}

/// Convert tool definitions to Ollama function format.
fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }
            })
        })
        .collect()
}

#[async_trait]
impl LanguageModel for OllamaProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        let request = ChatRequest {
            model: options.model.clone(),
            messages: convert_messages(&messages, options.system.as_deref()),
            tools: convert_tools(&options.tools),
            stream: true,
            think: options.think,
            options: (!options.options.is_empty()).then_some(options.options),
        };

        info!(
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            think = ?request.think,
            "Sending Ollama chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Ollama request failed");

            if status.as_u16() == 404 {
                return Err(ProviderError::ModelNotFound(request.model));
            }
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ProviderError::api_error(status.as_u16(), message));
        }

        Ok(self.parse_stream(response, options.abort))
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelSummary>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api_error(status.as_u16(), body));
        }

        let tags: TagsResponse = response.json().await?;
        debug!(count = tags.models.len(), "Listed Ollama models");
        Ok(tags.models)
    }

    fn provider_id(&self) -> &str {
        "ollama"
    }
}

/// A locally available model reported by `/api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
}

impl ModelSummary {
    pub fn supports_thinking(&self) -> bool {
        supports_thinking(&self.name)
    }
}

// Request/response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(flatten)]
    metrics: Metrics,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}
