//! Model Context Protocol (MCP) client for ollmcp.
//!
//! Connects to any number of MCP tool servers at once and merges their
//! catalogs into one namespaced view the model can call into.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌─────────────┐
//! │   session   │────▶│ ServerRegistry │────▶│ MCP Servers │
//! │   (model)   │◀────│                │◀────│   (tools)   │
//! └─────────────┘     └────────────────┘     └─────────────┘
//! ```
//!
//! # Supported Transports
//!
//! - **stdio**: Local servers via stdin/stdout
//! - **SSE**: Remote servers via Server-Sent Events (HTTP)
//! - **Streamable HTTP**: Remote servers via plain HTTP POST
//!
//! # Example
//!
//! ```no_run
//! use ollmcp_mcp::{ServerDescriptor, ServerRegistry, ToolId};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut registry = ServerRegistry::new();
//! registry
//!     .add_server(ServerDescriptor::stdio(
//!         "filesystem",
//!         "npx",
//!         ["-y", "@modelcontextprotocol/server-filesystem"],
//!     ))
//!     .await?;
//!
//! for tool in registry.list_tools() {
//!     println!("{} - {}", tool.id, tool.description);
//! }
//!
//! let result = registry
//!     .call_tool(
//!         &ToolId::new("filesystem", "read_file"),
//!         serde_json::json!({ "path": "/path/to/file" }),
//!     )
//!     .await?;
//! println!("{}", result.to_text());
//! # Ok(())
//! # }
//! ```

mod connection;
pub mod discovery;
mod error;
pub mod http;
pub mod mock;
pub mod protocol;
mod registry;
mod server;
pub mod sse;
mod stdio;
mod tool;
mod transport;

pub use connection::ServerConnection;
pub use discovery::{
    auto_discover, collect_descriptors, load_server_config, parse_server_config,
    script_descriptor, url_descriptor, ServerSources,
};
pub use error::{McpError, McpResult};
pub use http::{HttpConfig, HttpTransport};
pub use protocol::{McpTool, ToolCallResult, ToolContent};
pub use registry::{validate_arguments, ServerFailures, ServerRegistry};
pub use server::{ServerDescriptor, TransportKind};
pub use sse::{SseConfig, SseTransport};
pub use stdio::StdioTransport;
pub use tool::{Tool, ToolId};
pub use transport::{Connector, Timeouts, Transport, TransportConnector};
