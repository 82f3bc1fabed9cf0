use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::DEFAULT_PROTOCOL_VERSION;
use super::protocol::JSONRPC_VERSION;

/// Minimal line-delimited JSON-RPC client, used to drive an MCP server over
/// any byte stream (a child's stdio, an in-memory duplex).
pub struct McpClient<R, W> {
    reader: BufReader<R>,
    writer: W,
    next_id: AtomicU64,
}

impl<R, W> McpClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            next_id: AtomicU64::new(1),
        }
    }

    /// Run the `initialize` handshake and return the server's result.
    pub async fn initialize(&mut self) -> Result<Value, McpClientError> {
        let result = self
            .call_method(
                "initialize",
                json!({
                    "protocolVersion": DEFAULT_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "buckaroo-mcp-client", "version": env!("CARGO_PKG_VERSION")},
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(result)
    }

    pub async fn list_tools(&mut self) -> Result<Vec<Value>, McpClientError> {
        let response = self.call_method("tools/list", json!({})).await?;
        let tools = response
            .get("tools")
            .and_then(|value| value.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(tools)
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<Value, McpClientError> {
        self.call_method(
            "tools/call",
            json!({
                "name": name,
                "arguments": arguments
            }),
        )
        .await
    }

    pub async fn notify(&mut self, method: &str, params: Value) -> Result<(), McpClientError> {
        self.send(&json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
        }))
        .await
    }

    pub async fn call_method(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Value, McpClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.send(&json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                return Err(McpClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "mcp server closed connection",
                )));
            }
            let value: Value = serde_json::from_str(&line)?;
            let Some(response_id) = value.get("id") else {
                continue;
            };
            if !matches_id(response_id, id) {
                continue;
            }
            if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
                return Err(McpClientError::Rpc { code, message });
            }
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            return Ok(result);
        }
    }

    async fn send(&mut self, message: &Value) -> Result<(), McpClientError> {
        let mut encoded = serde_json::to_string(message)?;
        encoded.push('\n');
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

fn matches_id(value: &Value, expected: u64) -> bool {
    match value {
        Value::Number(num) => num.as_u64() == Some(expected),
        Value::String(text) => text.parse::<u64>().ok() == Some(expected),
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl McpClientError {
    /// JSON-RPC error code, when the server answered with an error.
    pub fn code(&self) -> Option<i64> {
        match self {
            McpClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
