//! Ollama client against a local HTTP stub.

use futures::StreamExt;
use ollmcp_provider::{
    GenerateOptions, LanguageModel, Message, ModelOptions, OllamaProvider, ProviderError,
    StreamChunk, ToolDefinition,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|l| format!("{l}\n"))
        .collect::<Vec<_>>()
        .join("")
}

#[tokio::test]
async fn chat_streams_text_tool_calls_and_metrics() {
    let server = MockServer::start().await;
    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "", "thinking": "Need weather"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "Let me check."}, "done": false}),
        json!({"message": {"role": "assistant", "content": "", "tool_calls": [
            {"function": {"name": "weather.get_forecast", "arguments": {"city": "Oslo"}}}
        ]}, "done": false}),
        json!({"message": {"role": "assistant", "content": ""}, "done": true,
               "eval_count": 12, "eval_duration": 500_000_000u64}),
    ]);
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&server.uri()).unwrap();
    let options = GenerateOptions {
        model: "qwen3:latest".into(),
        system: Some("Be brief".into()),
        think: Some(true),
        tools: vec![ToolDefinition {
            name: "weather.get_forecast".into(),
            description: "[weather] Get forecast".into(),
            parameters: json!({"type": "object"}),
        }],
        options: ModelOptions {
            temperature: Some(0.0),
            ..Default::default()
        },
        abort: None,
    };

    let chunks: Vec<StreamChunk> = provider
        .generate(vec![Message::user("Weather in Oslo?")], options)
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await;

    assert_eq!(chunks[0], StreamChunk::reasoning("Need weather"));
    assert_eq!(chunks[1], StreamChunk::text("Let me check."));
    match &chunks[2] {
        StreamChunk::ToolCall {
            name, arguments, ..
        } => {
            assert_eq!(name, "weather.get_forecast");
            assert_eq!(arguments, &json!({"city": "Oslo"}));
        }
        other => panic!("unexpected chunk: {other:?}"),
    }
    match &chunks[3] {
        StreamChunk::Finish { metrics } => assert_eq!(metrics.eval_rate(), Some(24.0)),
        other => panic!("unexpected chunk: {other:?}"),
    }

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "qwen3:latest");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["think"], true);
    assert_eq!(sent["options"], json!({"temperature": 0.0}));
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["tools"][0]["function"]["name"], "weather.get_forecast");
}

#[tokio::test]
async fn chat_without_thinking_flag_omits_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ndjson(&[json!({"message": {"content": "hi"}, "done": true})])),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&server.uri()).unwrap();
    let chunks: Vec<_> = provider
        .generate(
            vec![Message::user("hello")],
            GenerateOptions {
                model: "llama3.2".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 2);

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(sent.get("think").is_none());
    assert!(sent.get("options").is_none());
    assert!(sent.get("tools").is_none());
}

#[tokio::test]
async fn truncated_stream_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ndjson(&[json!({"message": {"content": "par"}, "done": false})])),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&server.uri()).unwrap();
    let chunks: Vec<_> = provider
        .generate(Vec::new(), GenerateOptions::default())
        .await
        .unwrap()
        .collect()
        .await;
    assert!(matches!(
        chunks.last(),
        Some(Err(ProviderError::StreamInterrupted))
    ));
}

#[tokio::test]
async fn unknown_model_maps_to_model_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"error":"model \"nope\" not found"}"#),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&server.uri()).unwrap();
    let result = provider
        .generate(
            Vec::new(),
            GenerateOptions {
                model: "nope".into(),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(ProviderError::ModelNotFound(m)) if m == "nope"));
}

#[tokio::test]
async fn list_models_reads_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "qwen3:latest", "size": 5_200_000_000u64, "modified_at": "2025-06-01T10:00:00Z"},
                {"name": "llama3.2:3b", "details": {"family": "llama", "parameter_size": "3.2B"}}
            ]
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&server.uri()).unwrap();
    provider.check_connection().await.unwrap();

    let models = provider.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert!(models[0].supports_thinking());
    assert_eq!(models[0].size, Some(5_200_000_000));
    assert_eq!(
        models[1].details.as_ref().unwrap().parameter_size.as_deref(),
        Some("3.2B")
    );
}
