//! ollmcp - chat with Ollama models that can call tools on MCP servers.
//!
//! This is the main entry point for the ollmcp CLI.

mod console;
mod logging;
mod repl;

use anyhow::Context;
use clap::Parser;
use console::{Console, StdinReviewer, TerminalObserver};
use ollmcp_core::{ConfigStore, ModelSession};
use ollmcp_mcp::{collect_descriptors, ServerRegistry, ServerSources};
use ollmcp_provider::{OllamaProvider, DEFAULT_HOST};
use repl::Repl;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ollmcp")]
#[command(author, version, about = "Chat with Ollama models that call tools on MCP servers", long_about = None)]
struct Cli {
    /// Path to an MCP server script (.py or .js); repeatable
    #[arg(short = 's', long = "mcp-server")]
    mcp_server: Vec<PathBuf>,

    /// URL of an SSE or streamable HTTP MCP server; repeatable
    #[arg(short = 'u', long = "mcp-server-url")]
    mcp_server_url: Vec<String>,

    /// JSON file with an `mcpServers` map
    #[arg(short = 'j', long = "servers-json")]
    servers_json: Option<PathBuf>,

    /// Also load servers from the Claude config (~/.claude.json)
    #[arg(short = 'a', long = "auto-discovery")]
    auto_discovery: bool,

    /// Model to use (overrides the saved config)
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama host
    #[arg(short = 'H', long, env = "OLLAMA_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_file = init(&cli);

    let result = run(cli).await;

    if let Some(path) = log_file {
        eprintln!("Logs: {}", path.display());
    }
    result
}

fn init(cli: &Cli) -> Option<PathBuf> {
    let log_file = logging::init_logging(cli.verbose);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting ollmcp");
    log_file
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let provider = OllamaProvider::new(&cli.host)
        .with_context(|| format!("invalid Ollama host `{}`", cli.host))?;
    provider.check_connection().await.with_context(|| {
        format!(
            "Ollama is not reachable at {}; start it with `ollama serve`",
            provider.host()
        )
    })?;

    let sources = ServerSources {
        scripts: cli.mcp_server,
        urls: cli.mcp_server_url,
        config_file: cli.servers_json,
        auto_discovery: cli.auto_discovery,
    };
    let (descriptors, problems) = collect_descriptors(&sources);
    for problem in &problems {
        warn!(error = %problem, "Skipping server source");
        eprintln!("Warning: {problem}");
    }

    let console = Console::new();
    let mut session = ModelSession::new(
        Arc::new(provider),
        ServerRegistry::new(),
        Arc::new(StdinReviewer::new(console.clone())),
    )
    .with_observer(Arc::new(TerminalObserver::new()))
    .with_sources(sources);

    if !descriptors.is_empty() {
        println!("Connecting to {} MCP servers...", descriptors.len());
    }
    let failures = session.connect_servers(descriptors).await;
    repl::report_failures(&failures);

    let store = ConfigStore::default_location()?;
    let mut repl = Repl::new(session, console, store);
    repl.start(cli.model.as_deref()).await;
    repl.run().await
}
