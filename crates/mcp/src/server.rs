//! Host side: serve a [`ToolRegistry`] as a stdio tool server.
//!
//! Requests are handled one at a time in arrival order. Notifications are
//! accepted and never answered.

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use toolchat_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, info, warn};
use crate::protocol::*;

/// Identity reported in the `initialize` result.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "toolchat".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Serve `registry` until `reader` reaches end of input.
pub async fn serve<R, W>(
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(server = %info.name, tools = registry.len(), "Serving tools over stdio");
    let mut lines = LineReader::new(reader);

    while let Some(line) = lines.next_line().await? {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Input line is not UTF-8");
                let response = JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {e}"));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match Incoming::parse(&line) {
            Ok(Incoming::Request(request)) => Some(handle_request(&registry, &info, request).await),
            Ok(Incoming::Notification(note)) => {
                debug!(method = %note.method, "Notification received");
                None
            }
            Ok(Incoming::Response(response)) => {
                warn!(id = %response.id, "Ignoring unexpected response");
                None
            }
            Err(e) => Some(JsonRpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            )),
        };

        if let Some(response) = response {
            write_response(&mut writer, &response).await?;
        }
    }

    info!("Client closed the connection");
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> std::io::Result<()> {
    let mut out = serde_json::to_string(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await
}

async fn handle_request(
    registry: &ToolRegistry,
    info: &ServerInfo,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    debug!(id = %request.id, method = %request.method, "Request received");
    let id = request.id;

    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": info.name, "version": info.version },
            }),
        ),
        "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
        "tools/list" => {
            let result = ToolsListResult {
                tools: registry.definitions().into_iter().map(ToolInfo::from).collect(),
                next_cursor: None,
            };
            match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::failure(id, INVALID_REQUEST, e.to_string()),
            }
        }
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, "tools/call requires 'name'");
            };
            let arguments = match params.get("arguments") {
                None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
                Some(args) => args.clone(),
            };

            let call = ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            };
            let result = if call.arguments.is_object() {
                registry.invoke(&call).await
            } else {
                registry.failure_for(
                    &call.id,
                    &toolchat_core::ToolError::invalid_args(name, "arguments must be a JSON object"),
                )
            };

            let body = CallToolResult {
                content: vec![ContentBlock::text(result.output)],
                is_error: !result.success,
                structured_content: result.data,
            };
            match serde_json::to_value(body) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::failure(id, INVALID_REQUEST, e.to_string()),
            }
        }
        other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    }
}
