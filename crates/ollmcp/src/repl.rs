//! The interactive prompt and its commands.

use crate::console::Console;
use anyhow::Context;
use ollmcp_core::config::FIELDS;
use ollmcp_core::selection::{self, Layout};
use ollmcp_core::visibility::ServerState;
use ollmcp_core::{ConfigSnapshot, ConfigStore, CoreError, ModelSession};
use ollmcp_mcp::ServerFailures;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A recognised command. Anything else is sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Tools,
    Model,
    ModelConfig,
    Context,
    ThinkingMode,
    ShowThinking,
    ShowToolExecution,
    ShowMetrics,
    Clear,
    ContextInfo,
    ClearScreen,
    SaveConfig(Option<String>),
    LoadConfig(Option<String>),
    ResetConfig,
    ReloadServers,
    HumanInTheLoop,
    Quit,
}

impl Command {
    /// Recognise `input` as a command, with or without its argument.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.split_whitespace();
        let head = parts.next()?.to_ascii_lowercase();
        let arg = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return None;
        }

        let command = match (head.as_str(), arg) {
            ("help" | "h", None) => Self::Help,
            ("tools" | "t", None) => Self::Tools,
            ("model" | "m", None) => Self::Model,
            ("model-config" | "mc", None) => Self::ModelConfig,
            ("context" | "c", None) => Self::Context,
            ("thinking-mode" | "tm", None) => Self::ThinkingMode,
            ("show-thinking" | "st", None) => Self::ShowThinking,
            ("show-tool-execution" | "ste", None) => Self::ShowToolExecution,
            ("show-metrics" | "sm", None) => Self::ShowMetrics,
            ("clear" | "cc", None) => Self::Clear,
            ("context-info" | "ci", None) => Self::ContextInfo,
            ("clear-screen" | "cls", None) => Self::ClearScreen,
            ("save-config" | "sc", arg) => Self::SaveConfig(arg),
            ("load-config" | "lc", arg) => Self::LoadConfig(arg),
            ("reset-config" | "rc", None) => Self::ResetConfig,
            ("reload-servers" | "rs", None) => Self::ReloadServers,
            ("human-in-the-loop" | "hil", None) => Self::HumanInTheLoop,
            ("quit" | "q" | "exit", None) => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

const HELP: &str = "\
Commands:
  help, h                      Show this help
  tools, t                     Enable or disable tools
  model, m                     List installed models and switch
  model-config, mc             Set or unset generation parameters
  context, c                   Toggle keeping conversation history
  thinking-mode, tm            Toggle thinking for models that support it
  show-thinking, st            Toggle printing the model's reasoning
  show-tool-execution, ste     Toggle printing tool calls and results
  show-metrics, sm             Toggle printing timing after each reply
  clear, cc                    Forget the conversation so far
  context-info, ci             Show conversation size
  clear-screen, cls            Clear the terminal
  save-config, sc [name]       Save settings (default profile without a name)
  load-config, lc [name]       Load saved settings
  reset-config, rc             Restore default settings and enable every tool
  reload-servers, rs           Reconnect every MCP server
  human-in-the-loop, hil       Toggle asking before each tool call
  quit, q, exit                Leave

Anything else is sent to the model. Ctrl-C cancels a running reply.";

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Print per-server connection failures.
pub fn report_failures(failures: &ServerFailures) {
    for (server, error) in failures {
        eprintln!("Could not connect to {server}: {error}");
    }
}

/// Interactive loop over one session.
pub struct Repl {
    session: ModelSession,
    console: Console,
    store: ConfigStore,
}

impl Repl {
    pub fn new(session: ModelSession, console: Console, store: ConfigStore) -> Self {
        Self {
            session,
            console,
            store,
        }
    }

    /// Apply the saved default profile, then the model given on the
    /// command line, and print what the session starts with.
    pub async fn start(&mut self, model: Option<&str>) {
        match self.store.load(None).await {
            Ok(Some(snapshot)) => match snapshot.apply_to(&mut self.session) {
                Ok(()) => println!(
                    "Loaded settings from {}",
                    self.store.path_for(None).display()
                ),
                Err(e) => eprintln!("Warning: saved settings ignored: {e}"),
            },
            Ok(None) => {}
            Err(e) => eprintln!("Warning: saved settings ignored: {e}"),
        }
        if let Some(model) = model {
            self.session.set_model(model);
        }

        let registry = self.session.registry();
        println!("ollmcp v{}", env!("CARGO_PKG_VERSION"));
        println!("Model: {}", self.session.model_name());
        println!(
            "Servers: {} connected, {} of {} tools enabled",
            registry.server_names().len(),
            self.session.visibility().enabled_count(),
            self.session.visibility().len()
        );
        println!("Tool approval: {}", on_off(self.session.gate().enabled()));
    }

    /// Run until `quit`, end of input or Ctrl-C at the prompt, then close
    /// every server.
    pub async fn run(mut self) -> anyhow::Result<()> {
        println!("Type `help` for commands.");
        loop {
            println!();
            let prompt = format!("{}> ", self.session.model_name());
            let line = tokio::select! {
                line = self.console.read_line(&prompt) => line.context("failed to read input")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };
            if line.is_empty() {
                continue;
            }

            match Command::parse(&line) {
                Some(Command::Quit) => break,
                Some(command) => {
                    if let Err(e) = self.execute(command).await {
                        eprintln!("Error: {e:#}");
                    }
                }
                None => self.chat(&line).await,
            }
        }

        println!("Closing servers...");
        self.session.close().await;
        Ok(())
    }

    async fn chat(&mut self, input: &str) {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = self.session.send(input, cancel).await;
        watcher.abort();
        println!();

        match result {
            Ok(turn) if turn.truncated => {
                println!("Stopped after {} model requests.", turn.steps);
            }
            Ok(_) => {}
            Err(CoreError::Cancelled) => println!("Cancelled."),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Help => println!("{HELP}"),
            Command::Tools => self.select_tools().await?,
            Command::Model => self.select_model().await?,
            Command::ModelConfig => self.edit_model_config().await?,
            Command::Context => {
                let flags = self.session.flags_mut();
                flags.retain_context = !flags.retain_context;
                println!("Context retention {}", on_off(flags.retain_context));
            }
            Command::ThinkingMode => {
                if !self.session.supports_thinking() {
                    println!(
                        "{} does not support thinking mode.",
                        self.session.model_name()
                    );
                } else {
                    let flags = self.session.flags_mut();
                    flags.thinking_mode = !flags.thinking_mode;
                    println!("Thinking mode {}", on_off(flags.thinking_mode));
                }
            }
            Command::ShowThinking => {
                let flags = self.session.flags_mut();
                flags.show_thinking = !flags.show_thinking;
                println!("Show thinking {}", on_off(flags.show_thinking));
            }
            Command::ShowToolExecution => {
                let flags = self.session.flags_mut();
                flags.show_tool_execution = !flags.show_tool_execution;
                println!("Show tool execution {}", on_off(flags.show_tool_execution));
            }
            Command::ShowMetrics => {
                let flags = self.session.flags_mut();
                flags.show_metrics = !flags.show_metrics;
                println!("Show metrics {}", on_off(flags.show_metrics));
            }
            Command::Clear => {
                self.session.clear_history();
                println!("Conversation cleared.");
            }
            Command::ContextInfo => self.print_context_info(),
            Command::ClearScreen => print!("\x1B[2J\x1B[1;1H"),
            Command::SaveConfig(name) => {
                let snapshot = ConfigSnapshot::capture(&self.session);
                let path = self.store.save(name.as_deref(), &snapshot).await?;
                println!("Saved to {}", path.display());
            }
            Command::LoadConfig(name) => self.load_config(name.as_deref()).await?,
            Command::ResetConfig => {
                self.session.reset_settings();
                println!("Settings reset to defaults: all tools enabled, approvals on.");
                println!("Saved profiles are unchanged; use `save-config` to overwrite them.");
            }
            Command::ReloadServers => {
                let report = self.session.reload_servers().await;
                for problem in &report.problems {
                    eprintln!("Warning: {problem}");
                }
                report_failures(&report.failures);
                println!(
                    "Reloaded {} servers, {} tools.",
                    self.session.registry().server_names().len(),
                    self.session.visibility().len()
                );
            }
            Command::HumanInTheLoop => {
                let enabled = self.session.gate_mut().toggle();
                println!("Tool approval {}", on_off(enabled));
            }
            Command::Quit => {}
        }
        Ok(())
    }

    /// Load profile `name` into the session. A missing profile is reported,
    /// not an error.
    pub async fn load_config(&mut self, name: Option<&str>) -> anyhow::Result<()> {
        match self.store.load(name).await? {
            Some(snapshot) => {
                snapshot.apply_to(&mut self.session)?;
                info!(profile = name.unwrap_or("default"), "Config loaded");
                println!("Loaded {}", self.store.path_for(name).display());
            }
            None => println!("No saved config at {}", self.store.path_for(name).display()),
        }
        Ok(())
    }

    fn print_tools(&self, layout: &Layout) {
        let visibility = self.session.visibility();
        let mut number = 0;
        for (index, (server, ids)) in layout.servers().iter().enumerate() {
            let state = match visibility.server_state(server) {
                Some(ServerState::AllEnabled) => "all enabled",
                Some(ServerState::AllDisabled) => "all disabled",
                Some(ServerState::Mixed) | None => "mixed",
            };
            println!("S{} {server} ({state})", index + 1);
            for id in ids {
                number += 1;
                let mark = if visibility.is_enabled(id) { "x" } else { " " };
                println!("  [{mark}] {number:>3}. {}", id.tool);
            }
        }
        println!(
            "{} of {} tools enabled",
            visibility.enabled_count(),
            visibility.len()
        );
    }

    async fn select_tools(&mut self) -> anyhow::Result<()> {
        let catalog = self.session.catalog();
        if catalog.is_empty() {
            println!("No tools available.");
            return Ok(());
        }
        let layout = Layout::from_tools(&catalog);
        let before = self.session.visibility().clone();

        loop {
            self.print_tools(&layout);
            println!("Toggle with numbers (3), ranges (5-8), servers (S2), a/all, n/none.");
            let Some(input) = self
                .console
                .read_line("Selection (empty or s to save, q to cancel): ")
                .await?
            else {
                break;
            };

            match input.to_ascii_lowercase().as_str() {
                "" | "s" => break,
                "q" => {
                    *self.session.visibility_mut() = before;
                    println!("Changes discarded.");
                    return Ok(());
                }
                _ => {}
            }

            let selection = selection::parse(&input, &layout);
            if !selection.invalid.is_empty() {
                println!("Ignored: {}", selection.invalid.join(", "));
            }
            selection.apply(self.session.visibility_mut(), &catalog);
        }

        info!(
            enabled = self.session.visibility().enabled_count(),
            "Tool selection updated"
        );
        Ok(())
    }

    async fn select_model(&mut self) -> anyhow::Result<()> {
        let models = self
            .session
            .list_models()
            .await
            .context("failed to list models")?;
        if models.is_empty() {
            println!("No models installed. Pull one with `ollama pull <model>`.");
            return Ok(());
        }

        for (index, model) in models.iter().enumerate() {
            let current = if model.name == self.session.model_name() {
                "*"
            } else {
                " "
            };
            let size = model
                .details
                .as_ref()
                .and_then(|d| d.parameter_size.as_deref())
                .unwrap_or("");
            let thinking = if model.supports_thinking() {
                " (thinking)"
            } else {
                ""
            };
            println!("{current} {:>2}. {} {size}{thinking}", index + 1, model.name);
        }

        let Some(choice) = self
            .console
            .read_line("Model number or name (empty to keep): ")
            .await?
        else {
            return Ok(());
        };
        if choice.is_empty() {
            return Ok(());
        }

        let selected = match choice.parse::<usize>() {
            Ok(n) => models.get(n.wrapping_sub(1)).map(|m| m.name.clone()),
            Err(_) => models
                .iter()
                .find(|m| m.name == choice)
                .map(|m| m.name.clone()),
        };
        match selected {
            Some(name) => {
                self.session.set_model(name);
                println!("Using {}", self.session.model_name());
            }
            None => println!("Unknown model: {choice}"),
        }
        Ok(())
    }

    async fn edit_model_config(&mut self) -> anyhow::Result<()> {
        loop {
            let generation = self.session.generation();
            for field in FIELDS {
                let value = generation.get(field).unwrap_or_else(|| "unset".into());
                println!("  {field:<18} {value}");
            }
            println!("Enter `<field> <value>` to set, `unset <field>` to clear.");

            let Some(input) = self.console.read_line("model-config (empty to finish): ").await?
            else {
                return Ok(());
            };
            if input.is_empty() {
                return Ok(());
            }

            let result = match input.split_once(char::is_whitespace) {
                Some(("unset", field)) => self.session.generation_mut().unset(field.trim()),
                Some((field, value)) => self.session.generation_mut().set(field, value.trim()),
                None => {
                    println!("Expected `<field> <value>` or `unset <field>`.");
                    continue;
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "Rejected model config change");
                println!("{e}");
            }
        }
    }

    fn print_context_info(&self) {
        let summary = self.session.history_summary();
        let flags = self.session.flags();
        println!("Model: {}", self.session.model_name());
        println!("Context retention: {}", on_off(flags.retain_context));
        println!(
            "Turns: {} user, {} assistant, {} tool",
            summary.user_turns, summary.assistant_turns, summary.tool_turns
        );
        println!(
            "Size: {} characters, about {} tokens",
            summary.characters,
            summary.approx_tokens()
        );
        if self.session.supports_thinking() {
            println!("Thinking mode: {}", on_off(flags.thinking_mode));
        }
        println!("Tool approval: {}", on_off(self.session.gate().enabled()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_aliases() {
        assert_eq!(Command::parse("help"), Some(Command::Help));
        assert_eq!(Command::parse("  TM "), Some(Command::ThinkingMode));
        assert_eq!(Command::parse("exit"), Some(Command::Quit));
        assert_eq!(Command::parse("hil"), Some(Command::HumanInTheLoop));
        assert_eq!(
            Command::parse("save-config work"),
            Some(Command::SaveConfig(Some("work".into())))
        );
        assert_eq!(Command::parse("lc"), Some(Command::LoadConfig(None)));
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(Command::parse("what is the weather"), None);
        assert_eq!(Command::parse("help me"), None);
        assert_eq!(Command::parse("save-config a b"), None);
    }
}
