//! Terminal input and output: line reading, tool approval prompts and
//! streamed output.

use async_trait::async_trait;
use ollmcp_core::{ApprovalDecision, Reviewer, SessionObserver, SessionState};
use ollmcp_mcp::ToolId;
use ollmcp_provider::Metrics;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

/// Longest tool result echoed to the terminal.
const MAX_RESULT_CHARS: usize = 800;

/// Line reader over stdin, shared by the prompt and the reviewer.
#[derive(Clone)]
pub struct Console {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Print `prompt` and read one trimmed line. `None` at end of input.
    pub async fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;
        let line = self.lines.lock().await.next_line().await?;
        Ok(line.map(|l| l.trim().to_string()))
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an answer to the approval prompt.
pub fn parse_decision(input: &str) -> Option<ApprovalDecision> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(ApprovalDecision::Approve),
        "n" | "no" => Some(ApprovalDecision::Deny),
        "disable" => Some(ApprovalDecision::DisableGate),
        _ => None,
    }
}

/// Asks the person at the terminal about each tool call.
pub struct StdinReviewer {
    console: Console,
}

impl StdinReviewer {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

#[async_trait]
impl Reviewer for StdinReviewer {
    async fn review(&self, tool: &ToolId, arguments: &Value) -> ApprovalDecision {
        let pretty =
            serde_json::to_string_pretty(arguments).unwrap_or_else(|_| arguments.to_string());
        println!();
        println!("Tool call requested: {tool}");
        println!("Arguments: {pretty}");

        loop {
            let answer = self
                .console
                .read_line("Execute this call? [y]es / [n]o / [disable] approvals: ")
                .await;
            match answer {
                Ok(Some(line)) => match parse_decision(&line) {
                    Some(decision) => {
                        if decision == ApprovalDecision::DisableGate {
                            println!(
                                "Approvals disabled. Use `human-in-the-loop` to turn them back on."
                            );
                        }
                        return decision;
                    }
                    None => println!("Please answer y, n or disable."),
                },
                Ok(None) => return ApprovalDecision::Deny,
                Err(e) => {
                    warn!(error = %e, "Could not read approval answer");
                    return ApprovalDecision::Deny;
                }
            }
        }
    }
}

/// Streams session progress to stdout.
#[derive(Default)]
pub struct TerminalObserver {
    thinking: AtomicBool,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_thinking(&self) {
        if self.thinking.swap(false, Ordering::SeqCst) {
            println!();
            println!("---");
        }
    }
}

fn flush() {
    // A failed flush only delays output.
    let _ = io::stdout().flush();
}

/// Shorten `text` to at most `max` characters.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!(
            "{}... ({} more characters)",
            &text[..cut],
            text[cut..].chars().count()
        ),
        None => text.to_string(),
    }
}

fn seconds(nanos: Option<u64>) -> String {
    nanos
        .map(|n| format!("{:.2}s", n as f64 / 1e9))
        .unwrap_or_else(|| "-".into())
}

fn count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn rate(value: Option<f64>) -> String {
    value
        .map(|r| format!("{r:.1} tokens/s"))
        .unwrap_or_else(|| "-".into())
}

impl SessionObserver for TerminalObserver {
    fn on_state(&self, state: SessionState) {
        if state == SessionState::Idle {
            self.end_thinking();
        }
    }

    fn on_text(&self, delta: &str) {
        self.end_thinking();
        print!("{delta}");
        flush();
    }

    fn on_thinking(&self, delta: &str) {
        if !self.thinking.swap(true, Ordering::SeqCst) {
            println!("Thinking:");
        }
        print!("{delta}");
        flush();
    }

    fn on_tool_call(&self, tool: &ToolId, arguments: &Value) {
        self.end_thinking();
        println!();
        println!("[tool] {tool} {arguments}");
    }

    fn on_tool_result(&self, tool: &ToolId, content: &str, is_error: bool) {
        let label = if is_error { "failed" } else { "result" };
        println!("[{label}] {tool}: {}", truncate(content, MAX_RESULT_CHARS));
    }

    fn on_metrics(&self, metrics: &Metrics) {
        println!();
        println!(
            "[metrics] total {} | load {} | prompt {} tokens in {} ({}) | response {} tokens in {} ({})",
            seconds(metrics.total_duration),
            seconds(metrics.load_duration),
            count(metrics.prompt_eval_count),
            seconds(metrics.prompt_eval_duration),
            rate(metrics.prompt_eval_rate()),
            count(metrics.eval_count),
            seconds(metrics.eval_duration),
            rate(metrics.eval_rate()),
        );
    }
}
