//! Stdio transport for local MCP servers (newline-delimited JSON-RPC).

use crate::error::{McpError, McpResult};
use crate::protocol::{parse_response, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Grace period for a server to exit after its stdin closes.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// MCP transport over a child process's stdin/stdout.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<Lines<BufReader<ChildStdout>>>>,
    connected: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process.
    pub fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> McpResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(command = command, args = ?args, "Starting MCP server process");

        let mut child = cmd.spawn().map_err(|e| {
            McpError::connection_failed(format!("failed to spawn `{command}`: {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::ProcessError("Failed to get stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::ProcessError("Failed to get stdout".to_string()))?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(BufReader::new(stdout).lines())),
            connected: AtomicBool::new(true),
        })
    }

    /// Write one message line.
    async fn send_line(&self, content: &str) -> McpResult<()> {
        let mut stdin_guard = self.stdin.lock().await;
        let stdin = stdin_guard
            .as_mut()
            .ok_or_else(|| McpError::connection_failed("Transport closed"))?;

        trace!(message = %content, "Sending MCP message");

        let written = async {
            stdin.write_all(content.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            self.connected.store(false, Ordering::SeqCst);
            return Err(McpError::connection_failed(format!("write to server failed: {e}")));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let id = request
            .id
            .ok_or_else(|| McpError::protocol_error("request without id"))?;

        // Holding the reader across send and receive keeps exchanges serial.
        let mut stdout_guard = self.stdout.lock().await;
        self.send_line(&serde_json::to_string(&request)?).await?;

        let lines = stdout_guard
            .as_mut()
            .ok_or_else(|| McpError::connection_failed("Transport closed"))?;

        loop {
            let Some(line) = lines.next_line().await? else {
                self.connected.store(false, Ordering::SeqCst);
                return Err(McpError::connection_failed("Server closed connection"));
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            trace!(content = %line, "Received MCP message");

            match parse_response(line) {
                Ok(Some(response)) if response.id == id => return Ok(response),
                Ok(Some(response)) => {
                    debug!(expected = id, got = response.id, "Skipping unmatched response");
                }
                Ok(None) => {
                    debug!("Skipping server-initiated message");
                }
                Err(e) => {
                    debug!(error = %e, "Skipping non-JSON output from server");
                }
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        self.send_line(&serde_json::to_string(&notification)?).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        // Closing stdin asks the server to exit
        self.stdin.lock().await.take();

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(status = %status, "MCP server exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed waiting for MCP server"),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill MCP server");
                    }
                }
            }
        }

        self.stdout.lock().await.take();
        debug!("Closed stdio transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(ref mut child) = *guard {
                let _ = child.start_kill();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A shell one-liner that answers every request line with a fixed result,
    /// after printing a log line and a notification first.
    fn echo_server() -> StdioTransport {
        let script = r#"
            while IFS= read -r line; do
              id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
              if [ -n "$id" ]; then
                echo "starting up"
                echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
                echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"echo\":$id}}"
              fi
            done
        "#;
        StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()], &HashMap::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_transport_creation_failure() {
        let result = StdioTransport::spawn("nonexistent_mcp_server_12345", &[], &HashMap::new());
        match result {
            Err(McpError::ConnectionFailed(message)) => {
                assert!(message.contains("nonexistent_mcp_server_12345"))
            }
            _ => panic!("expected connection failure"),
        }
    }

    #[tokio::test]
    async fn test_request_skips_noise_and_matches_id() {
        let transport = echo_server();
        assert!(transport.is_connected());

        let response = transport
            .request(JsonRpcRequest::new(41, "tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.id, 41);
        assert_eq!(response.result.unwrap()["echo"], 41);

        let response = transport
            .request(JsonRpcRequest::new(42, "tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.id, 42);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_and_close_twice() {
        let transport = echo_server();
        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await
            .unwrap();

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        transport.close().await.unwrap();

        let result = transport
            .request(JsonRpcRequest::new(1, "tools/list", None))
            .await;
        assert!(matches!(result, Err(McpError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_server_exit_is_connection_error() {
        let transport =
            StdioTransport::spawn("sh", &["-c".to_string(), "exit 0".to_string()], &HashMap::new())
                .unwrap();
        let result = transport
            .request(JsonRpcRequest::new(1, "initialize", None))
            .await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }
}
