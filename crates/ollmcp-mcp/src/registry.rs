//! Registry of connected MCP servers.

use crate::connection::ServerConnection;
use crate::error::{McpError, McpResult};
use crate::protocol::ToolCallResult;
use crate::server::ServerDescriptor;
use crate::tool::{Tool, ToolId};
use crate::transport::{Connector, Timeouts, TransportConnector};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of servers connected at once during startup and reload.
const CONNECT_CONCURRENCY_LIMIT: usize = 3;

/// Per-server failures reported by bulk connect and reload.
pub type ServerFailures = Vec<(String, McpError)>;

/// Owns every server connection and the namespaced tool catalog.
pub struct ServerRegistry {
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
    /// Descriptors as originally supplied, including ones that failed to connect.
    descriptors: BTreeMap<String, ServerDescriptor>,
    /// Live connections, keyed (and therefore ordered) by server name.
    servers: BTreeMap<String, ServerConnection>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRegistry {
    /// Registry that opens real transports.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TransportConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            timeouts: Timeouts::default(),
            descriptors: BTreeMap::new(),
            servers: BTreeMap::new(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Connect one server and merge its tools.
    ///
    /// Fails with `DuplicateServer` before connecting when the name is taken.
    /// Disabled descriptors are accepted and skipped.
    pub async fn add_server(&mut self, descriptor: ServerDescriptor) -> McpResult<()> {
        if self.descriptors.contains_key(&descriptor.name) {
            return Err(McpError::DuplicateServer(descriptor.name));
        }
        if !descriptor.enabled {
            debug!(server = %descriptor.name, "Server is disabled, skipping");
            return Ok(());
        }

        let connection =
            ServerConnection::connect(descriptor.clone(), self.connector.as_ref(), self.timeouts)
                .await?;
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self.servers.insert(connection.name().to_string(), connection);
        Ok(())
    }

    /// Connect a batch of servers concurrently.
    ///
    /// Every enabled descriptor is remembered, even when it fails, so a later
    /// [`reload_all`](Self::reload_all) retries it.
    pub async fn connect_all(&mut self, descriptors: Vec<ServerDescriptor>) -> ServerFailures {
        let mut failures = Vec::new();
        let mut batch = Vec::new();

        for descriptor in descriptors {
            if self.descriptors.contains_key(&descriptor.name) {
                let name = descriptor.name.clone();
                failures.push((name.clone(), McpError::DuplicateServer(name)));
                continue;
            }
            if !descriptor.enabled {
                debug!(server = %descriptor.name, "Server is disabled, skipping");
                continue;
            }
            self.descriptors.insert(descriptor.name.clone(), descriptor.clone());
            batch.push(descriptor);
        }

        failures.extend(self.connect_batch(batch).await);
        failures
    }

    async fn connect_batch(&mut self, batch: Vec<ServerDescriptor>) -> ServerFailures {
        let connector = self.connector.clone();
        let timeouts = self.timeouts;

        let results: Vec<_> = stream::iter(batch)
            .map(|descriptor| {
                let connector = connector.clone();
                async move {
                    let name = descriptor.name.clone();
                    let result =
                        ServerConnection::connect(descriptor, connector.as_ref(), timeouts).await;
                    (name, result)
                }
            })
            .buffer_unordered(CONNECT_CONCURRENCY_LIMIT)
            .collect()
            .await;

        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(connection) => {
                    self.servers.insert(name, connection);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "Failed to connect MCP server");
                    failures.push((name, e));
                }
            }
        }
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        failures
    }

    /// Close a server and forget it.
    pub async fn remove_server(&mut self, name: &str) -> McpResult<()> {
        let known = self.descriptors.remove(name).is_some();
        match self.servers.remove(name) {
            Some(connection) => {
                connection.close().await;
                info!(server = %name, "Disconnected from MCP server");
                Ok(())
            }
            None if known => Ok(()),
            None => Err(McpError::ServerNotFound(name.to_string())),
        }
    }

    /// Reconnect every known server using its original descriptor.
    ///
    /// A failure on one server does not stop the others; the failed server
    /// is dropped from the live set but kept for the next reload.
    pub async fn reload_all(&mut self) -> ServerFailures {
        info!(count = self.descriptors.len(), "Reloading MCP servers");

        for (name, connection) in std::mem::take(&mut self.servers) {
            debug!(server = %name, "Closing for reload");
            connection.close().await;
        }

        let batch: Vec<_> = self.descriptors.values().cloned().collect();
        self.connect_batch(batch).await
    }

    /// Close every server and connect `descriptors` in their place.
    ///
    /// Servers missing from `descriptors` are forgotten; the rest behave as
    /// in [`connect_all`](Self::connect_all).
    pub async fn replace_all(&mut self, descriptors: Vec<ServerDescriptor>) -> ServerFailures {
        info!(count = descriptors.len(), "Replacing MCP servers");
        self.close_all().await;
        self.descriptors.clear();
        self.connect_all(descriptors).await
    }

    /// All tools across connected servers, ordered by server name and then
    /// by the order each server reported them.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.servers
            .values()
            .flat_map(|connection| connection.tools().iter().cloned())
            .collect()
    }

    /// Tools of one connected server, in server order.
    pub fn server_tools(&self, name: &str) -> Option<&[Tool]> {
        self.servers.get(name).map(ServerConnection::tools)
    }

    /// Names of connected servers, sorted.
    pub fn server_names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// Descriptors of every known server, connected or not.
    pub fn descriptors(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.descriptors.values()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn find_tool(&self, id: &ToolId) -> Option<&Tool> {
        self.servers
            .get(&id.server)?
            .tools()
            .iter()
            .find(|tool| tool.id == *id)
    }

    /// Route a call to the server owning `id`.
    ///
    /// Arguments are checked against the tool's input schema before anything
    /// is sent.
    pub async fn call_tool(&self, id: &ToolId, arguments: Value) -> McpResult<ToolCallResult> {
        let connection = self
            .servers
            .get(&id.server)
            .ok_or_else(|| McpError::ServerNotFound(id.server.clone()))?;
        let tool = connection
            .tools()
            .iter()
            .find(|tool| tool.id == *id)
            .ok_or_else(|| McpError::ToolNotFound(id.to_string()))?;

        validate_arguments(tool, &arguments)?;
        connection.call_tool(&id.tool, arguments).await
    }

    /// Close every connection.
    pub async fn close_all(&mut self) {
        for (name, connection) in std::mem::take(&mut self.servers) {
            debug!(server = %name, "Closing MCP server");
            connection.close().await;
        }
    }
}

/// Structural check of arguments against a tool's JSON Schema.
///
/// A schema the validator cannot compile is not held against the caller.
pub fn validate_arguments(tool: &Tool, arguments: &Value) -> McpResult<()> {
    let validator = match jsonschema::validator_for(&tool.input_schema) {
        Ok(validator) => validator,
        Err(e) => {
            debug!(tool = %tool.id, error = %e, "Skipping validation for unusable schema");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(McpError::InvalidArguments {
            tool: tool.id.to_string(),
            message: errors.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockServer};
    use crate::transport::Transport;
    use serde_json::json;

    fn descriptor(name: &str) -> ServerDescriptor {
        ServerDescriptor::stdio(name, "mock", Vec::<String>::new())
    }

    fn registry(connector: MockConnector) -> ServerRegistry {
        ServerRegistry::with_connector(Arc::new(connector))
    }

    #[tokio::test]
    async fn test_add_server_rejects_duplicates() {
        let connector = MockConnector::new().with_server(MockServer::new("a").with_tool("a1", ""));
        let mut registry = registry(connector);

        registry.add_server(descriptor("a")).await.unwrap();
        let err = registry.add_server(descriptor("a")).await.unwrap_err();
        assert!(matches!(err, McpError::DuplicateServer(name) if name == "a"));
        assert_eq!(registry.list_tools().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_servers_are_skipped() {
        let connector = MockConnector::new().with_server(MockServer::new("a").with_tool("a1", ""));
        let mut registry = registry(connector);

        registry.add_server(descriptor("a").disabled()).await.unwrap();
        assert!(registry.list_tools().is_empty());
        assert!(!registry.is_connected("a"));
    }

    #[tokio::test]
    async fn test_tools_are_namespaced_and_ordered() {
        let connector = MockConnector::new()
            .with_server(MockServer::new("zeta").with_tool("search", ""))
            .with_server(MockServer::new("alpha").with_tool("search", "").with_tool("fetch", ""));
        let mut registry = registry(connector);

        let failures = registry
            .connect_all(vec![descriptor("zeta"), descriptor("alpha")])
            .await;
        assert!(failures.is_empty());

        let ids: Vec<String> = registry.list_tools().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["alpha.search", "alpha.fetch", "zeta.search"]);
    }

    #[tokio::test]
    async fn test_call_routes_to_owning_server() {
        let alpha = MockServer::new("alpha").with_result("search", "from alpha");
        alpha.add_tool("search", "");
        let zeta = MockServer::new("zeta").with_result("search", "from zeta");
        zeta.add_tool("search", "");
        let connector = MockConnector::new()
            .with_server(alpha.clone())
            .with_server(zeta.clone());
        let mut registry = registry(connector);
        registry
            .connect_all(vec![descriptor("alpha"), descriptor("zeta")])
            .await;

        let result = registry
            .call_tool(&ToolId::new("zeta", "search"), json!({}))
            .await
            .unwrap();
        assert_eq!(result.to_text(), "from zeta");
        assert!(alpha.calls().is_empty());
        assert_eq!(zeta.calls().len(), 1);

        let err = registry
            .call_tool(&ToolId::new("zeta", "fetch"), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));

        let err = registry
            .call_tool(&ToolId::new("nope", "search"), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
    }

    #[tokio::test]
    async fn test_schema_violation_is_not_dispatched() {
        let server = MockServer::new("weather").with_schema_tool(
            "get_forecast",
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        );
        let connector = MockConnector::new().with_server(server.clone());
        let mut registry = registry(connector);
        registry.add_server(descriptor("weather")).await.unwrap();

        let id = ToolId::new("weather", "get_forecast");
        let err = registry.call_tool(&id, json!({"city": 3})).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
        assert!(server.calls().is_empty());

        registry.call_tool(&id, json!({"city": "Oslo"})).await.unwrap();
        assert_eq!(server.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_server_drops_tools() {
        let connector = MockConnector::new()
            .with_server(MockServer::new("a").with_tool("a1", ""))
            .with_server(MockServer::new("b").with_tool("b1", ""));
        let mut registry = registry(connector);
        registry.connect_all(vec![descriptor("a"), descriptor("b")]).await;

        registry.remove_server("b").await.unwrap();
        assert!(registry.list_tools().iter().all(|t| t.server() != "b"));
        assert_eq!(registry.server_names(), vec!["a".to_string()]);

        let err = registry.remove_server("b").await.unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
    }

    #[tokio::test]
    async fn test_reload_collects_failures_and_keeps_others() {
        let connector = Arc::new(
            MockConnector::new()
                .with_server(MockServer::new("a").with_tool("a1", ""))
                .with_server(MockServer::new("b").with_tool("b1", "")),
        );
        let mut registry = ServerRegistry::with_connector(connector.clone());
        registry.connect_all(vec![descriptor("a"), descriptor("b")]).await;

        connector.set_unreachable("a", true);
        let failures = registry.reload_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "a");
        assert_eq!(registry.server_names(), vec!["b".to_string()]);

        connector.set_unreachable("a", false);
        let failures = registry.reload_all().await;
        assert!(failures.is_empty());
        assert_eq!(registry.server_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_all_remembers_failed_servers() {
        let connector = Arc::new(MockConnector::new());
        let mut registry = ServerRegistry::with_connector(connector.clone());

        let failures = registry.connect_all(vec![descriptor("late")]).await;
        assert_eq!(failures.len(), 1);
        assert!(registry.list_tools().is_empty());

        connector.add_server(MockServer::new("late").with_tool("t", ""));
        assert!(registry.reload_all().await.is_empty());
        assert_eq!(registry.list_tools().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all_forgets_unlisted_servers() {
        let connector = MockConnector::new()
            .with_server(MockServer::new("a").with_tool("a1", ""))
            .with_server(MockServer::new("b").with_tool("b1", ""))
            .with_server(MockServer::new("c").with_tool("c1", ""));
        let mut registry = registry(connector);
        registry.connect_all(vec![descriptor("a"), descriptor("b")]).await;

        let failures = registry
            .replace_all(vec![descriptor("b"), descriptor("c")])
            .await;
        assert!(failures.is_empty());
        assert_eq!(registry.server_names(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(registry.descriptors().count(), 2);
    }

    #[tokio::test]
    async fn test_close_all() {
        let server = MockServer::new("a").with_tool("a1", "");
        let connector = MockConnector::new().with_server(server.clone());
        let mut registry = registry(connector);
        registry.add_server(descriptor("a")).await.unwrap();

        registry.close_all().await;
        assert!(registry.list_tools().is_empty());
        assert!(!server.is_connected());
    }
}
