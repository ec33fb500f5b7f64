//! Namespaced tool catalog entries.

use crate::protocol::McpTool;
use serde_json::{json, Value};
use std::fmt;

/// Namespaced identity of a tool: the owning server plus the tool name.
///
/// Different servers may expose tools with the same name, so dispatch always
/// goes through this pair. `server.tool` is only the wire/display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId {
    pub server: String,
    pub tool: String,
}

impl ToolId {
    pub fn new(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
        }
    }

    /// Qualified name advertised to the model.
    pub fn wire_name(&self) -> String {
        format!("{}.{}", self.server, self.tool)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.server, self.tool)
    }
}

/// One callable exposed by a connected server.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    /// Owning server and tool name.
    pub id: ToolId,
    /// Human description reported by the server.
    pub description: String,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
}

impl Tool {
    pub fn new(
        server: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            id: ToolId::new(server, name),
            description: description.into(),
            input_schema,
        }
    }

    /// Convert a catalog entry reported by `server`.
    pub fn from_mcp(server: &str, tool: McpTool) -> Self {
        Self {
            id: ToolId::new(server, tool.name),
            description: tool.description.unwrap_or_default(),
            input_schema: tool
                .input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        }
    }

    pub fn server(&self) -> &str {
        &self.id.server
    }

    pub fn name(&self) -> &str {
        &self.id.tool
    }

    /// Description as advertised to the model, tagged with the server.
    pub fn qualified_description(&self) -> String {
        format!("[{}] {}", self.id.server, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name() {
        let id = ToolId::new("weather", "get_forecast");
        assert_eq!(id.wire_name(), "weather.get_forecast");
        assert_eq!(id.to_string(), "weather.get_forecast");
    }

    #[test]
    fn test_same_tool_name_on_two_servers_is_distinct() {
        let a = ToolId::new("a", "search");
        let b = ToolId::new("b", "search");
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_from_mcp_defaults_schema() {
        let tool = Tool::from_mcp(
            "weather",
            McpTool {
                name: "get_alerts".to_string(),
                description: None,
                input_schema: None,
            },
        );
        assert_eq!(tool.server(), "weather");
        assert_eq!(tool.name(), "get_alerts");
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["type"], "object");
        assert_eq!(tool.qualified_description(), "[weather] ");
    }
}
