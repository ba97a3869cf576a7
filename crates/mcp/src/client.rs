//! Client side of a stdio tool server connection.
//!
//! One background task reads the server's output and routes each response to
//! the request waiting on its id. Requests are written under an async mutex
//! so lines never interleave.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use toolchat_config::ToolServerConfig;
use toolchat_core::error::ToolError;
use toolchat_core::provider::ToolDefinition;
use toolchat_core::tool::{RemoteToolServer, ToolResult};
use tracing::{debug, info, warn};
use crate::protocol::*;

type ResponseWaiter = oneshot::Sender<JsonRpcResponse>;
type PendingRequests = Arc<Mutex<HashMap<u64, ResponseWaiter>>>;

/// A connection to one tool server.
pub struct McpClient {
    name: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingRequests,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
    // Held so the child is killed when the client is dropped.
    _child: Option<Child>,
}

impl McpClient {
    /// Launch the configured command and perform the initialize handshake.
    pub async fn spawn(config: &ToolServerConfig) -> Result<Self, ToolError> {
        let transport = |reason: String| ToolError::Transport {
            server: config.name.clone(),
            reason,
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport(format!("failed to start '{}': {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport("child stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = config.name.clone();
            tokio::spawn(async move {
                let mut lines = LineReader::new(stderr);
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(line) = line {
                        debug!(server = %server, "{line}");
                    }
                }
            });
        }

        info!(server = %config.name, command = %config.command, "Started tool server");

        let mut client = Self::start(
            &config.name,
            stdout,
            stdin,
            Duration::from_secs(config.timeout_secs),
        );
        client._child = Some(child);
        client.initialize().await?;
        Ok(client)
    }

    /// Connect over an existing reader/writer pair and perform the handshake.
    pub async fn connect<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> Result<Self, ToolError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client = Self::start(&name.into(), reader, writer, request_timeout);
        client.initialize().await?;
        Ok(client)
    }

    fn start<R, W>(name: &str, reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            name.to_string(),
            reader,
            pending.clone(),
            closed.clone(),
        ));

        Self {
            name: name.to_string(),
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            request_timeout,
            reader_task,
            _child: None,
        }
    }

    fn transport_error(&self, reason: impl Into<String>) -> ToolError {
        ToolError::Transport {
            server: self.name.clone(),
            reason: reason.into(),
        }
    }

    async fn write_line(&self, value: &impl serde::Serialize) -> Result<(), ToolError> {
        let mut line = serde_json::to_string(value)
            .map_err(|e| self.transport_error(format!("encode failed: {e}")))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("write failed: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("flush failed: {e}")))
    }

    /// Send a request and wait for the response with the same id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, ToolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.transport_error("connection closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        // Register before writing so a fast reply cannot miss its waiter.
        {
            let mut pending = self.pending.lock().await;
            // The reader sets `closed` before clearing under this lock.
            if self.closed.load(Ordering::Acquire) {
                return Err(self.transport_error("connection closed"));
            }
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_line(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        debug!(server = %self.name, id, method, "Sent request");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(self.transport_error(format!(
                "connection closed while waiting for '{method}'"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ToolError::Timeout {
                    tool_name: format!("{}/{method}", self.name),
                    timeout_secs: self.request_timeout.as_secs(),
                })
            }
        }
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        let response = self
            .request(
                "initialize",
                Some(initialize_params("toolchat", env!("CARGO_PKG_VERSION"))),
            )
            .await?;
        let result = response
            .into_result()
            .map_err(|e| self.transport_error(format!("initialize rejected: {e}")))?;

        debug!(
            server = %self.name,
            protocol = %result["protocolVersion"].as_str().unwrap_or("unknown"),
            "Tool server initialized"
        );
        self.write_line(&JsonRpcNotification::new("notifications/initialized"))
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop<R>(name: String, reader: R, pending: PendingRequests, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = LineReader::new(reader);
    loop {
        let line = match lines.next_line().await {
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(e))) => {
                warn!(server = %name, error = %e, "Tool server sent a line that is not UTF-8");
                continue;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(server = %name, error = %e, "Read from tool server failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Incoming::parse(&line) {
            Ok(Incoming::Response(response)) => {
                let Some(id) = response.id.as_u64() else {
                    warn!(server = %name, id = %response.id, "Response with non-numeric id");
                    continue;
                };
                match pending.lock().await.remove(&id) {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => warn!(server = %name, id, "Response for unknown request id"),
                }
            }
            Ok(Incoming::Notification(note)) => {
                debug!(server = %name, method = %note.method, "Tool server notification");
            }
            Ok(Incoming::Request(request)) => {
                warn!(server = %name, method = %request.method, "Ignoring request from tool server");
            }
            Err(e) => warn!(server = %name, error = %e, "Unparseable line from tool server"),
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the waiters wakes every pending request with a closed-channel error.
    pending.lock().await.clear();
    info!(server = %name, "Tool server connection closed");
}

#[async_trait]
impl RemoteToolServer for McpClient {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let response = self
                .request("tools/list", tools_list_params(cursor.as_deref()))
                .await?;
            let result = response
                .into_result()
                .map_err(|e| self.transport_error(format!("tools/list failed: {e}")))?;
            let page: ToolsListResult = serde_json::from_value(result)
                .map_err(|e| self.transport_error(format!("bad tools/list result: {e}")))?;

            tools.extend(page.tools.into_iter().map(ToolDefinition::from));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(server = %self.name, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        let response = self
            .request("tools/call", Some(tools_call_params(name, arguments)))
            .await?;

        let result = match response.into_result() {
            Ok(result) => result,
            Err(error) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: error.to_string(),
                });
            }
        };

        let call: CallToolResult = serde_json::from_value(result)
            .map_err(|e| self.transport_error(format!("bad tools/call result: {e}")))?;

        let text = call.text();
        let mut tool_result = if call.is_error {
            ToolResult::failure(text)
        } else {
            ToolResult::ok(text)
        };
        if let Some(data) = call.structured_content {
            tool_result = tool_result.with_data(data);
        }
        Ok(tool_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    /// A scripted server: answers `initialize` and `tools/list`, and answers
    /// `tools/call` only when `answer_calls` is set. With `garble` set, every
    /// response is preceded by a line of invalid UTF-8.
    async fn fake_server(io: DuplexStream, answer_calls: bool, garble: bool) {
        let (reader, mut writer) = tokio::io::split(io);
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(Incoming::Request(req)) = Incoming::parse(&line) else {
                continue;
            };
            let result = match req.method.as_str() {
                "initialize" => serde_json::json!({"protocolVersion": PROTOCOL_VERSION, "capabilities": {}}),
                "tools/list" => match req.params.as_ref().and_then(|p| p["cursor"].as_str()) {
                    None => serde_json::json!({
                        "tools": [{"name": "get_stock_quote", "description": "Quote", "inputSchema": {"type": "object"}}],
                        "nextCursor": "page2"
                    }),
                    Some(_) => serde_json::json!({
                        "tools": [{"name": "get_company_profile", "inputSchema": {"type": "object"}}]
                    }),
                },
                "tools/call" if answer_calls => {
                    let symbol = req.params.as_ref().map(|p| p["arguments"]["symbol"].clone());
                    serde_json::json!({
                        "content": [{"type": "text", "text": format!("quote for {}", symbol.unwrap_or_default())}],
                        "isError": false
                    })
                }
                _ => continue,
            };
            let mut out = serde_json::to_string(&JsonRpcResponse::success(req.id, result)).unwrap();
            out.push('\n');
            if garble {
                writer.write_all(b"\xff\xfe\n").await.unwrap();
            }
            writer.write_all(out.as_bytes()).await.unwrap();
        }
    }

    fn client_halves(io: DuplexStream) -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        tokio::io::split(io)
    }

    #[tokio::test]
    async fn lists_tools_across_pages() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_server(server_io, true, false));
        let (r, w) = client_halves(client_io);
        let client = McpClient::connect("fake", r, w, Duration::from_secs(5)).await.unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_stock_quote", "get_company_profile"]);
    }

    #[tokio::test]
    async fn call_tool_returns_text() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_server(server_io, true, false));
        let (r, w) = client_halves(client_io);
        let client = McpClient::connect("fake", r, w, Duration::from_secs(5)).await.unwrap();

        let result = client
            .call_tool("get_stock_quote", serde_json::json!({"symbol": "AAPL"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "quote for \"AAPL\"");
    }

    #[tokio::test]
    async fn unanswered_call_times_out() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_server(server_io, false, false));
        let (r, w) = client_halves(client_io);
        let client = McpClient::connect("fake", r, w, Duration::from_millis(200)).await.unwrap();

        let err = client
            .call_tool("get_stock_quote", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn closed_stream_is_transport_error() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = tokio::spawn(fake_server(server_io, false, false));
        let (r, w) = client_halves(client_io);
        let client = McpClient::connect("fake", r, w, Duration::from_secs(5)).await.unwrap();

        server.abort();
        let _ = server.await;
        // Give the reader task a chance to observe EOF.
        for _ in 0..50 {
            if client.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolError::Transport { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_close_connection() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_server(server_io, true, true));
        let (r, w) = client_halves(client_io);
        let client = McpClient::connect("fake", r, w, Duration::from_secs(5)).await.unwrap();

        let result = client
            .call_tool("get_stock_quote", serde_json::json!({"symbol": "IBM"}))
            .await
            .unwrap();
        assert_eq!(result.output, "quote for \"IBM\"");
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn close_racing_a_new_request_is_transport_error() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        tokio::spawn(fake_server(server_io, false, false));
        let (r, w) = client_halves(client_io);
        let client = Arc::new(
            McpClient::connect("fake", r, w, Duration::from_secs(60)).await.unwrap(),
        );

        // Hold the pending map so the request stalls after its first check.
        let guard = client.pending.lock().await;
        let requester = client.clone();
        let request = tokio::spawn(async move { requester.request("ping", None).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        client.closed.store(true, Ordering::Release);
        drop(guard);

        let err = tokio::time::timeout(Duration::from_secs(2), request)
            .await
            .expect("request should not wait for its timeout")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ToolError::Transport { .. }), "got {err:?}");
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_command_fails_to_spawn() {
        let config = ToolServerConfig {
            name: "ghost".into(),
            command: "/nonexistent/tool-server".into(),
            args: vec![],
            env: HashMap::new(),
            timeout_secs: 1,
            enabled: true,
        };
        let err = McpClient::spawn(&config).await.err().unwrap();
        assert!(matches!(err, ToolError::Transport { server, .. } if server == "ghost"));
    }
}
