//! The chat session: history, the tool loop and runtime settings.
//!
//! One call to [`ModelSession::send`] runs a full turn:
//!
//! ```text
//! idle -> awaiting-model -> (tool calls?) -> awaiting-approval -> executing-tool
//!              ^                                   |                   |
//!              +-------------- tool result turn ---+-------------------+
//! ```
//!
//! Every tool call the model makes is answered by exactly one tool turn,
//! whether the call ran, failed, was declined or was cancelled.

use crate::approval::{ApprovalGate, Reviewer};
use crate::config::GenerationConfig;
use crate::error::{CoreError, CoreResult};
use crate::visibility::ToolVisibility;
use futures::StreamExt;
use ollmcp_mcp::{
    collect_descriptors, McpError, McpResult, ServerDescriptor, ServerFailures, ServerRegistry,
    ServerSources, Tool, ToolId,
};
use ollmcp_provider::{
    supports_thinking, ContentPart, GenerateOptions, LanguageModel, Message, Metrics,
    ModelSummary, ProviderError, Role, StreamChunk, ToolDefinition, DEFAULT_MODEL,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on model requests in one turn.
pub const MAX_STEPS: usize = 25;

/// Default deadline for one model round trip.
pub const MODEL_TIMEOUT: Duration = Duration::from_secs(300);

/// Tool turn recorded when the reviewer declines a call.
pub const DECLINED: &str = "Tool call was skipped by user";

/// Tool turn recorded when a call is cut short by cancellation.
pub const CANCELLED: &str = "Tool call was cancelled";

/// Where the session is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingModel,
    AwaitingApproval,
    ExecutingTool,
}

/// Receives progress while a turn runs.
///
/// All methods default to doing nothing.
pub trait SessionObserver: Send + Sync {
    fn on_state(&self, _state: SessionState) {}
    /// A fragment of the reply text.
    fn on_text(&self, _delta: &str) {}
    /// A fragment of model reasoning. Only sent when thinking is shown.
    fn on_thinking(&self, _delta: &str) {}
    /// A tool call about to be reviewed. Only sent when tool execution is shown.
    fn on_tool_call(&self, _tool: &ToolId, _arguments: &Value) {}
    /// The tool turn recorded for a call. Only sent when tool execution is shown.
    fn on_tool_result(&self, _tool: &ToolId, _content: &str, _is_error: bool) {}
    /// Timing of a finished model request. Only sent when metrics are shown.
    fn on_metrics(&self, _metrics: &Metrics) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Runtime switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFlags {
    /// Keep history between turns.
    pub retain_context: bool,
    /// Ask thinking-capable models to reason before answering.
    pub thinking_mode: bool,
    /// Forward reasoning text to the observer.
    pub show_thinking: bool,
    /// Forward tool calls and results to the observer.
    pub show_tool_execution: bool,
    /// Forward request metrics to the observer.
    pub show_metrics: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            retain_context: true,
            thinking_mode: true,
            show_thinking: false,
            show_tool_execution: true,
            show_metrics: false,
        }
    }
}

/// Outcome of one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    /// Final reply text.
    pub text: String,
    /// Model requests made.
    pub steps: usize,
    /// Tool calls answered, including declined and failed ones.
    pub tool_calls: usize,
    /// Metrics of the last model request, if the model reported any.
    pub metrics: Option<Metrics>,
    /// The step limit ended the turn before the model stopped calling tools.
    pub truncated: bool,
}

/// Counts shown by `context-info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistorySummary {
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub tool_turns: usize,
    pub characters: usize,
}

impl HistorySummary {
    /// Rough token estimate at four characters per token.
    pub fn approx_tokens(&self) -> usize {
        self.characters / 4
    }

    pub fn total_turns(&self) -> usize {
        self.user_turns + self.assistant_turns + self.tool_turns
    }
}

/// Outcome of [`ModelSession::reload_servers`].
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Servers that could not be reconnected.
    pub failures: ServerFailures,
    /// Server sources that could not be read.
    pub problems: Vec<McpError>,
}

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: Value,
}

#[derive(Debug, Default)]
struct ModelReply {
    text: String,
    calls: Vec<PendingCall>,
    metrics: Option<Metrics>,
}

enum CallOutcome {
    Answered(Message),
    Cancelled(Message),
}

/// A chat with one model over a set of MCP servers.
pub struct ModelSession {
    model: Arc<dyn LanguageModel>,
    registry: ServerRegistry,
    sources: Option<ServerSources>,
    visibility: ToolVisibility,
    gate: ApprovalGate,
    observer: Arc<dyn SessionObserver>,
    history: Vec<Message>,
    model_name: String,
    generation: GenerationConfig,
    flags: SessionFlags,
    state: SessionState,
    model_timeout: Duration,
    max_steps: usize,
}

impl ModelSession {
    /// Create a session. The visibility map is synced to whatever the
    /// registry already holds.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: ServerRegistry,
        reviewer: Arc<dyn Reviewer>,
    ) -> Self {
        let mut visibility = ToolVisibility::new();
        visibility.sync(&registry.list_tools());
        Self {
            model,
            registry,
            sources: None,
            visibility,
            gate: ApprovalGate::new(reviewer),
            observer: Arc::new(NoopObserver),
            history: Vec::new(),
            model_name: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
            flags: SessionFlags::default(),
            state: SessionState::Idle,
            model_timeout: MODEL_TIMEOUT,
            max_steps: MAX_STEPS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Remember where servers came from so a reload reads them again.
    pub fn with_sources(mut self, sources: ServerSources) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state");
            self.state = state;
            self.observer.on_state(state);
        }
    }

    // Model

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn set_model(&mut self, name: impl Into<String>) {
        self.model_name = name.into();
        info!(model = %self.model_name, "Model selected");
    }

    /// Whether the current model accepts the thinking flag.
    pub fn supports_thinking(&self) -> bool {
        supports_thinking(&self.model_name)
    }

    /// Models installed on the backend.
    pub async fn list_models(&self) -> CoreResult<Vec<ModelSummary>> {
        Ok(self.model.list_models().await?)
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn generation_mut(&mut self) -> &mut GenerationConfig {
        &mut self.generation
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut SessionFlags {
        &mut self.flags
    }

    // History

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("Conversation history cleared");
    }

    pub fn history_summary(&self) -> HistorySummary {
        self.history
            .iter()
            .fold(HistorySummary::default(), |mut summary, message| {
                match message.role {
                    Role::User => summary.user_turns += 1,
                    Role::Assistant => summary.assistant_turns += 1,
                    Role::Tool => summary.tool_turns += 1,
                    Role::System => {}
                }
                summary.characters += message.char_len();
                summary
            })
    }

    // Tools and servers

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Every live tool, ordered by server name then server order.
    pub fn catalog(&self) -> Vec<Tool> {
        self.registry.list_tools()
    }

    pub fn visibility(&self) -> &ToolVisibility {
        &self.visibility
    }

    pub fn visibility_mut(&mut self) -> &mut ToolVisibility {
        &mut self.visibility
    }

    /// Tools the model will be offered.
    pub fn visible_tools(&self) -> Vec<Tool> {
        self.visibility.visible_tools(&self.registry.list_tools())
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut ApprovalGate {
        &mut self.gate
    }

    fn sync_visibility(&mut self) {
        let offline: BTreeSet<String> = self
            .registry
            .descriptors()
            .filter(|d| !self.registry.is_connected(&d.name))
            .map(|d| d.name.clone())
            .collect();
        self.visibility
            .sync_with_offline(&self.registry.list_tools(), &offline);
    }

    /// Restore default flags, turn approvals back on and enable every tool.
    /// The model, generation settings and saved profiles are left alone.
    pub fn reset_settings(&mut self) {
        self.flags = SessionFlags::default();
        self.gate.set_enabled(true);
        self.visibility.enable_all();
        info!("Settings reset to defaults");
    }

    pub async fn add_server(&mut self, descriptor: ServerDescriptor) -> McpResult<()> {
        let result = self.registry.add_server(descriptor).await;
        self.sync_visibility();
        result
    }

    pub async fn connect_servers(&mut self, descriptors: Vec<ServerDescriptor>) -> ServerFailures {
        let failures = self.registry.connect_all(descriptors).await;
        self.sync_visibility();
        failures
    }

    pub async fn remove_server(&mut self, name: &str) -> McpResult<()> {
        let result = self.registry.remove_server(name).await;
        self.sync_visibility();
        result
    }

    /// Reconnect every server and re-sync visibility.
    ///
    /// With sources set, they are read again, so servers added to or removed
    /// from a config file show up. Otherwise the known descriptors are
    /// reused. Flags of tools that survive the reload are kept; new tools
    /// start enabled.
    pub async fn reload_servers(&mut self) -> ReloadReport {
        let report = match &self.sources {
            Some(sources) => {
                let (descriptors, problems) = collect_descriptors(sources);
                for problem in &problems {
                    warn!(error = %problem, "Skipping server source");
                }
                ReloadReport {
                    failures: self.registry.replace_all(descriptors).await,
                    problems,
                }
            }
            None => ReloadReport {
                failures: self.registry.reload_all().await,
                problems: Vec::new(),
            },
        };
        self.sync_visibility();
        info!(
            tools = self.visibility.len(),
            failed = report.failures.len(),
            "Servers reloaded"
        );
        report
    }

    /// Close every server connection.
    pub async fn close(&mut self) {
        self.registry.close_all().await;
        self.sync_visibility();
    }

    // Turns

    /// Run one user turn to completion.
    ///
    /// The session is back in [`SessionState::Idle`] when this returns,
    /// whatever the outcome. On error the history stays well formed: every
    /// recorded tool call has its tool turn.
    pub async fn send(&mut self, input: &str, cancel: CancellationToken) -> CoreResult<TurnResult> {
        let result = self.run_turn(input, &cancel).await;
        self.set_state(SessionState::Idle);
        if let Err(e) = &result {
            warn!(error = %e, "Turn failed");
        }
        result
    }

    async fn run_turn(&mut self, input: &str, cancel: &CancellationToken) -> CoreResult<TurnResult> {
        if !self.flags.retain_context {
            self.history.clear();
        }
        self.history.push(Message::user(input));

        let tools = self.visible_tools();
        let definitions: Vec<ToolDefinition> = tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.id.wire_name(),
                description: tool.qualified_description(),
                parameters: tool.input_schema.clone(),
            })
            .collect();

        let mut result = TurnResult::default();
        loop {
            if result.steps >= self.max_steps {
                warn!(max_steps = self.max_steps, "Max steps reached");
                result.truncated = true;
                return Ok(result);
            }
            result.steps += 1;
            debug!(step = result.steps, "Requesting model");

            self.set_state(SessionState::AwaitingModel);
            let reply = self.request_model(definitions.clone(), cancel).await?;

            if let Some(metrics) = &reply.metrics {
                if self.flags.show_metrics {
                    self.observer.on_metrics(metrics);
                }
            }
            result.text = reply.text.clone();
            result.metrics = reply.metrics.clone();

            self.history.push(assistant_turn(&reply));
            if reply.calls.is_empty() {
                return Ok(result);
            }

            info!("Executing {} tool calls", reply.calls.len());
            let mut calls = reply.calls.into_iter();
            while let Some(call) = calls.next() {
                result.tool_calls += 1;
                match self.handle_call(&call, &tools, cancel).await {
                    CallOutcome::Answered(message) => self.history.push(message),
                    CallOutcome::Cancelled(message) => {
                        self.history.push(message);
                        for rest in calls {
                            self.history
                                .push(Message::tool_error(rest.id, rest.name, CANCELLED));
                        }
                        return Err(CoreError::Cancelled);
                    }
                }
            }
        }
    }

    async fn request_model(
        &self,
        tools: Vec<ToolDefinition>,
        cancel: &CancellationToken,
    ) -> CoreResult<ModelReply> {
        let options = GenerateOptions {
            model: self.model_name.clone(),
            system: self.generation.system().map(str::to_string),
            tools,
            think: supports_thinking(&self.model_name).then_some(self.flags.thinking_mode),
            options: self.generation.options.clone(),
            abort: Some(cancel.clone()),
        };
        let messages = self.history.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            outcome = tokio::time::timeout(self.model_timeout, self.stream_reply(messages, options)) => {
                match outcome {
                    Ok(reply) => reply,
                    Err(_) => Err(CoreError::Timeout {
                        operation: "model request",
                        after: self.model_timeout,
                    }),
                }
            }
        }
    }

    /// Drain one model stream. Tool calls are only acted on once the whole
    /// reply has arrived.
    async fn stream_reply(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> CoreResult<ModelReply> {
        let mut stream = self
            .model
            .generate(messages, options)
            .await
            .map_err(provider_error)?;

        let mut reply = ModelReply::default();
        while let Some(chunk) = stream.next().await {
            match chunk.map_err(provider_error)? {
                StreamChunk::TextDelta(delta) => {
                    self.observer.on_text(&delta);
                    reply.text.push_str(&delta);
                }
                StreamChunk::ReasoningDelta(delta) => {
                    if self.flags.show_thinking {
                        self.observer.on_thinking(&delta);
                    }
                }
                StreamChunk::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    debug!(id = %id, name = %name, "Tool call complete");
                    reply.calls.push(PendingCall {
                        id,
                        name,
                        arguments,
                    });
                }
                StreamChunk::Finish { metrics } => {
                    reply.metrics = (!metrics.is_empty()).then_some(metrics);
                }
            }
        }
        Ok(reply)
    }

    async fn handle_call(
        &mut self,
        call: &PendingCall,
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let matching: Vec<&Tool> = tools
            .iter()
            .filter(|tool| tool.id.wire_name() == call.name)
            .collect();
        let tool = match matching.as_slice() {
            [tool] => *tool,
            [] => {
                warn!(tool = %call.name, "Model requested an unavailable tool");
                return CallOutcome::Answered(Message::tool_error(
                    &call.id,
                    &call.name,
                    format!("Error: tool `{}` is not available", call.name),
                ));
            }
            _ => {
                warn!(tool = %call.name, "Model requested an ambiguous tool name");
                return CallOutcome::Answered(Message::tool_error(
                    &call.id,
                    &call.name,
                    format!("Error: tool name `{}` is ambiguous", call.name),
                ));
            }
        };
        let id = tool.id.clone();
        let show = self.flags.show_tool_execution;

        self.set_state(SessionState::AwaitingApproval);
        if show {
            self.observer.on_tool_call(&id, &call.arguments);
        }

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            decision = self.gate.review(&id, &call.arguments) => Some(decision),
        };
        let Some(decision) = decision else {
            return CallOutcome::Cancelled(Message::tool_error(&call.id, &call.name, CANCELLED));
        };
        if !decision.approves() {
            info!(tool = %id, "Tool call declined");
            if show {
                self.observer.on_tool_result(&id, DECLINED, false);
            }
            return CallOutcome::Answered(Message::tool_result(&call.id, &call.name, DECLINED));
        }

        self.set_state(SessionState::ExecutingTool);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.registry.call_tool(&id, call.arguments.clone()) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            warn!(tool = %id, "Tool call cancelled");
            if show {
                self.observer.on_tool_result(&id, CANCELLED, true);
            }
            return CallOutcome::Cancelled(Message::tool_error(&call.id, &call.name, CANCELLED));
        };

        let (content, is_error) = match outcome {
            Ok(result) => (result.to_text(), result.is_error),
            Err(McpError::Timeout) => ("Error: tool call timed out".to_string(), true),
            Err(e) => (format!("Error: {e}"), true),
        };
        if is_error {
            warn!(tool = %id, "Tool call failed: {}", content);
        }
        if show {
            self.observer.on_tool_result(&id, &content, is_error);
        }

        let message = if is_error {
            Message::tool_error(&call.id, &call.name, content)
        } else {
            Message::tool_result(&call.id, &call.name, content)
        };
        CallOutcome::Answered(message)
    }
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("model", &self.model_name)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

fn provider_error(error: ProviderError) -> CoreError {
    match error {
        ProviderError::Cancelled => CoreError::Cancelled,
        other => other.into(),
    }
}

fn assistant_turn(reply: &ModelReply) -> Message {
    let mut content = Vec::with_capacity(reply.calls.len() + 1);
    if !reply.text.is_empty() || reply.calls.is_empty() {
        content.push(ContentPart::text(&reply.text));
    }
    for call in &reply.calls {
        content.push(ContentPart::tool_call(
            &call.id,
            &call.name,
            call.arguments.clone(),
        ));
    }
    Message {
        role: Role::Assistant,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use ollmcp_provider::mock::MockModel;

    fn session(model: Arc<MockModel>) -> ModelSession {
        ModelSession::new(model, ServerRegistry::new(), Arc::new(AutoApprove))
    }

    #[test]
    fn test_assistant_turn_keeps_calls_in_order() {
        let reply = ModelReply {
            text: String::new(),
            calls: vec![
                PendingCall {
                    id: "call_1".into(),
                    name: "a.x".into(),
                    arguments: Value::Null,
                },
                PendingCall {
                    id: "call_2".into(),
                    name: "b.y".into(),
                    arguments: Value::Null,
                },
            ],
            metrics: None,
        };
        let turn = assistant_turn(&reply);
        let ids: Vec<_> = turn.tool_calls().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec!["call_1", "call_2"]);
        assert_eq!(turn.content.len(), 2);
    }

    #[test]
    fn test_empty_reply_still_records_assistant_turn() {
        let turn = assistant_turn(&ModelReply::default());
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.text(), "");
    }

    #[tokio::test]
    async fn test_send_returns_to_idle() {
        let model = Arc::new(MockModel::new());
        model.expect_text("hello");
        let mut session = session(model);

        let result = session.send("hi", CancellationToken::new()).await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.steps, 1);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_history_summary() {
        let model = Arc::new(MockModel::new());
        model.expect_text("12345678");
        let mut session = session(model);
        session.send("abcd", CancellationToken::new()).await.unwrap();

        let summary = session.history_summary();
        assert_eq!(summary.user_turns, 1);
        assert_eq!(summary.assistant_turns, 1);
        assert_eq!(summary.total_turns(), 2);
        assert_eq!(summary.approx_tokens(), 3);
    }

    #[tokio::test]
    async fn test_model_error_leaves_user_turn() {
        let model = Arc::new(MockModel::new());
        model.expect_error("boom");
        let mut session = session(model);

        let err = session.send("hi", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::Provider(_)));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
