use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::{
    JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, JsonRpcResult, McpError, invalid_request,
    method_not_found, parse_error,
};
use super::tools::{self, ToolContext};
use super::{DEFAULT_PROTOCOL_VERSION, INSTRUCTIONS, SERVER_NAME, prompts, resources};

pub struct McpServer {
    service: Arc<McpService>,
}

impl McpServer {
    pub fn new(tools: Arc<ToolContext>) -> Self {
        Self {
            service: Arc::new(McpService { tools }),
        }
    }

    pub fn handle(&self) -> McpServerHandle {
        McpServerHandle {
            service: Arc::clone(&self.service),
        }
    }

    /// Serve stdin/stdout until the client closes stdin.
    pub async fn run_stdio(self) {
        info!("serving MCP on stdio");
        handle_connection(io::stdin(), io::stdout(), self.service).await;
        info!("stdin closed");
    }
}

#[derive(Clone)]
pub struct McpServerHandle {
    service: Arc<McpService>,
}

impl McpServerHandle {
    pub fn spawn_connection<R, W>(&self, reader: R, writer: W) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            handle_connection(reader, writer, service).await;
        })
    }
}

async fn handle_connection<R, W>(reader: R, writer: W, service: Arc<McpService>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(128);
    let writer_task = tokio::spawn(async move {
        write_loop(writer, &mut rx).await;
    });

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let Some(response) = dispatch_line(&service, trimmed).await else {
                    continue;
                };
                if tx.send(response).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "connection read error");
                break;
            }
        }
    }

    // Let queued replies drain before the writer goes away.
    drop(tx);
    if let Err(err) = writer_task.await {
        debug!(error = %err, "writer task ended abnormally");
    }
}

async fn dispatch_line(service: &Arc<McpService>, line: &str) -> Option<JsonRpcResponse> {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "failed to parse JSON payload");
            return Some(parse_error());
        }
    };
    let request = match serde_json::from_value::<JsonRpcRequest>(value.clone()) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "invalid JSON-RPC request");
            let id = value.get("id").cloned();
            return Some(invalid_request(id, "invalid request", Some(value)));
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return request
            .id
            .map(|id| invalid_request(Some(id), "jsonrpc version must be 2.0", None));
    }
    service.handle_request(request).await
}

async fn write_loop<W>(mut writer: W, rx: &mut mpsc::Receiver<JsonRpcResponse>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(mut text) => {
                text.push('\n');
                if writer.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            Err(err) => {
                error!(error = %err, "failed to serialize json");
            }
        }
    }
}

struct McpService {
    tools: Arc<ToolContext>,
}

impl McpService {
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        let params = params.unwrap_or_else(|| json!({}));

        let Some(id) = id else {
            debug!(%method, "notification");
            return None;
        };

        let outcome = match method.as_str() {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => return Some(JsonRpcResponse::Result(JsonRpcResult::empty(id))),
            "tools/list" => Ok(tools::list()),
            "tools/call" => self.call_tool(&params).await,
            "resources/list" => Ok(resources::list()),
            "resources/read" => resources::read(&params),
            "prompts/list" => Ok(prompts::list()),
            "prompts/get" => prompts::get(&params),
            other => {
                debug!(method = other, "unknown method");
                return Some(method_not_found(Some(id), other));
            }
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(err) => {
                warn!(%method, error = ?err, "request rejected");
                err.into_response(Some(id))
            }
        })
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid("tool name required"))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        debug!(tool = name, "tools/call");
        self.tools.call(name, &arguments).await
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {"listChanged": false},
            "resources": {"listChanged": false, "subscribe": false},
            "prompts": {"listChanged": false},
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": INSTRUCTIONS,
    })
}
