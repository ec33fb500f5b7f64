//! Streaming response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chunk from a streaming model response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta.
    TextDelta(String),

    /// Reasoning content delta.
    ReasoningDelta(String),

    /// A complete tool call. Never emitted for a partially streamed call.
    ToolCall {
        /// Call ID, unique within the conversation.
        id: String,
        /// Qualified tool name as the model wrote it.
        name: String,
        /// Arguments object.
        arguments: Value,
    },

    /// The response is finished.
    Finish {
        /// Timing and token counts for the response.
        metrics: Metrics,
    },
}

impl StreamChunk {
    /// Create a text delta chunk.
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    /// Create a reasoning delta chunk.
    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self::ReasoningDelta(delta.into())
    }

    /// Create a tool call chunk.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, StreamChunk::ToolCall { .. })
    }
}

/// Performance figures reported with the final chunk.
///
/// Durations are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

impl Metrics {
    /// Prompt tokens processed per second.
    pub fn prompt_eval_rate(&self) -> Option<f64> {
        rate(self.prompt_eval_count, self.prompt_eval_duration)
    }

    /// Generated tokens per second.
    pub fn eval_rate(&self) -> Option<f64> {
        rate(self.eval_count, self.eval_duration)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn rate(count: Option<u64>, duration_ns: Option<u64>) -> Option<f64> {
    match (count, duration_ns) {
        (Some(count), Some(ns)) if ns > 0 => Some(count as f64 / (ns as f64 / 1_000_000_000.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rates() {
        let metrics = Metrics {
            eval_count: Some(50),
            eval_duration: Some(2_000_000_000),
            prompt_eval_count: Some(10),
            prompt_eval_duration: Some(0),
            ..Default::default()
        };
        assert_eq!(metrics.eval_rate(), Some(25.0));
        assert_eq!(metrics.prompt_eval_rate(), None);
        assert!(!metrics.is_empty());
        assert!(Metrics::default().is_empty());
    }

    #[test]
    fn test_chunk_classification() {
        assert!(StreamChunk::tool_call("c1", "a.b", json!({})).is_tool());
        assert!(!StreamChunk::text("hello").is_tool());
        assert_eq!(
            StreamChunk::reasoning("hmm"),
            StreamChunk::ReasoningDelta("hmm".into())
        );
    }
}
