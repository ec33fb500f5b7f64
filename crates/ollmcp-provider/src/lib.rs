//! Language model abstraction for ollmcp.
//!
//! The session drives any [`LanguageModel`]; this crate ships the Ollama
//! client used in practice and a scripted [`mock::MockModel`] for tests.

pub mod error;
pub mod message;
pub mod ollama;
pub mod options;
pub mod stream;

// Testing providers
pub mod mock;

pub use error::{ProviderError, ProviderResult};
pub use message::{ContentPart, Message, Role};
pub use ollama::{supports_thinking, ModelSummary, OllamaProvider};
pub use options::ModelOptions;
pub use stream::{Metrics, StreamChunk};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

/// Default Ollama endpoint.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "qwen3:latest";

/// Options for one chat request.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Model to run.
    pub model: String,
    /// System prompt.
    pub system: Option<String>,
    /// Available tools.
    pub tools: Vec<ToolDefinition>,
    /// Thinking flag. `None` leaves it out of the request, which is what
    /// models without thinking support need.
    pub think: Option<bool>,
    /// Sampling options.
    pub options: ModelOptions,
    /// Cancellation token.
    pub abort: Option<tokio_util::sync::CancellationToken>,
}

/// A tool definition for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Qualified tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: Value,
}

/// The main trait for language models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a streaming response.
    ///
    /// Returns a stream of `StreamChunk` items ending with
    /// [`StreamChunk::Finish`].
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<BoxStream<'static, ProviderResult<StreamChunk>>>;

    /// Models the server can run.
    async fn list_models(&self) -> ProviderResult<Vec<ModelSummary>> {
        Ok(Vec::new())
    }

    /// Get the provider ID (e.g., "ollama").
    fn provider_id(&self) -> &str;
}

/// A boxed language model for dynamic dispatch.
pub type BoxedLanguageModel = Arc<dyn LanguageModel>;
