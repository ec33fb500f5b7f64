//! Scripted model for testing.

use crate::{
    error::ProviderError, message::Message, ollama::ModelSummary, stream::Metrics,
    stream::StreamChunk, GenerateOptions, LanguageModel, ProviderResult,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A scripted response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a text response.
    Text(String),
    /// Stream reasoning, then text.
    Thinking { thinking: String, text: String },
    /// Return text followed by tool calls, each `(name, arguments)`.
    ToolCalls {
        text: String,
        calls: Vec<(String, Value)>,
    },
    /// Fail the request before any chunk.
    Error(String),
    /// Stream some text, then fail.
    StreamError { partial: String, message: String },
    /// Never finish; ends only when the request is cancelled.
    Hang,
    /// Emit these chunks verbatim.
    Chunks(Vec<StreamChunk>),
}

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub messages: Vec<Message>,
    pub options: GenerateOptions,
}

/// Language model that replays queued responses.
#[derive(Debug, Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CapturedRequest>>,
    models: Mutex<Vec<String>>,
    metrics: Metrics,
    next_call_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockModel {
    /// Create a new mock model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report these metrics on every finish chunk.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Models returned by `list_models`.
    pub fn with_models(self, models: &[&str]) -> Self {
        *lock(&self.models) = models.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Queue a response.
    pub fn push(&self, response: MockResponse) {
        lock(&self.responses).push_back(response);
    }

    /// Expect a text response.
    pub fn expect_text(&self, text: impl Into<String>) {
        self.push(MockResponse::Text(text.into()));
    }

    /// Expect a single tool call.
    pub fn expect_tool_call(&self, name: impl Into<String>, arguments: Value) {
        self.expect_tool_calls(vec![(name.into(), arguments)]);
    }

    /// Expect several tool calls in one response.
    pub fn expect_tool_calls(&self, calls: Vec<(String, Value)>) {
        self.push(MockResponse::ToolCalls {
            text: String::new(),
            calls,
        });
    }

    /// Expect an error response.
    pub fn expect_error(&self, error: impl Into<String>) {
        self.push(MockResponse::Error(error.into()));
    }

    /// Get the number of times generate was called.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<CapturedRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Responses still queued.
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    fn call_id(&self) -> String {
        format!("call_{}", self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>> {
        let abort = options.abort.clone();
        lock(&self.requests).push(CapturedRequest { messages, options });

        let response = lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| MockResponse::Text("Mock response".to_string()));

        let finish = StreamChunk::Finish {
            metrics: self.metrics.clone(),
        };

        let chunks = match response {
            MockResponse::Error(message) => return Err(ProviderError::internal(message)),
            MockResponse::Text(text) => vec![StreamChunk::TextDelta(text), finish],
            MockResponse::Thinking { thinking, text } => vec![
                StreamChunk::ReasoningDelta(thinking),
                StreamChunk::TextDelta(text),
                finish,
            ],
            MockResponse::ToolCalls { text, calls } => {
                let mut chunks = Vec::new();
                if !text.is_empty() {
                    chunks.push(StreamChunk::TextDelta(text));
                }
                for (name, arguments) in calls {
                    chunks.push(StreamChunk::ToolCall {
                        id: self.call_id(),
                        name,
                        arguments,
                    });
                }
                chunks.push(finish);
                chunks
            }
            MockResponse::StreamError { partial, message } => {
                return Ok(Box::pin(try_stream! {
                    yield StreamChunk::TextDelta(partial);
                    Err(ProviderError::internal(message))?;
                }));
            }
            MockResponse::Hang => {
                return Ok(Box::pin(futures::stream::once(async move {
                    match abort {
                        Some(token) => token.cancelled().await,
                        None => futures::future::pending::<()>().await,
                    }
                    Err::<StreamChunk, _>(ProviderError::Cancelled)
                })));
            }
            MockResponse::Chunks(chunks) => chunks,
        };

        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelSummary>> {
        Ok(lock(&self.models)
            .iter()
            .map(|name| ModelSummary {
                name: name.clone(),
                size: None,
                modified_at: None,
                details: None,
            })
            .collect())
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_text_response() {
        let model = MockModel::new();
        model.expect_text("Hello, world!");

        let mut stream = model
            .generate(vec![Message::user("Hi")], GenerateOptions::default())
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            if let Ok(StreamChunk::TextDelta(delta)) = chunk {
                text.push_str(&delta);
            }
        }

        assert_eq!(text, "Hello, world!");
        assert_eq!(model.call_count(), 1);
        assert_eq!(model.last_request().unwrap().messages[0].text(), "Hi");
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let model = MockModel::new();
        model.expect_tool_call("weather.get_forecast", json!({"city": "Oslo"}));

        let chunks: Vec<_> = model
            .generate(vec![Message::user("Forecast")], GenerateOptions::default())
            .await
            .unwrap()
            .collect()
            .await;

        match &chunks[0] {
            Ok(StreamChunk::ToolCall { id, name, .. }) => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "weather.get_forecast");
            }
            other => panic!("unexpected chunk: {other:?}"),
        }
        assert!(matches!(chunks[1], Ok(StreamChunk::Finish { .. })));
    }

    #[tokio::test]
    async fn test_hang_ends_on_cancel() {
        let model = MockModel::new();
        model.push(MockResponse::Hang);
        let token = tokio_util::sync::CancellationToken::new();

        let mut stream = model
            .generate(
                Vec::new(),
                GenerateOptions {
                    abort: Some(token.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        token.cancel();
        assert!(matches!(
            stream.next().await,
            Some(Err(ProviderError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_error_and_list_models() {
        let model = MockModel::new().with_models(&["qwen3:latest", "llama3.2"]);
        model.expect_error("no model");
        assert!(model
            .generate(Vec::new(), GenerateOptions::default())
            .await
            .is_err());

        let models = model.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert!(models[0].supports_thinking());
    }
}
