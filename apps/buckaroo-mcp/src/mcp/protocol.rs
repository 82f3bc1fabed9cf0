use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    Result(JsonRpcResult),
    Error(JsonRpcErrorResponse),
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        JsonRpcResponse::Result(JsonRpcResult::new(id, result))
    }

    pub fn id(&self) -> Option<&Value> {
        match self {
            JsonRpcResponse::Result(result) => Some(&result.id),
            JsonRpcResponse::Error(error) => error.id.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcResult {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub error: JsonRpcError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResult {
    pub fn new(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }

    /// `{}` result, for methods that only acknowledge.
    pub fn empty(id: Value) -> Self {
        Self::new(id, Value::Object(Default::default()))
    }
}

impl JsonRpcErrorResponse {
    pub fn new(
        id: Option<Value>,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcError {
                code,
                message: message.into(),
                data,
            },
        }
    }
}

pub const ERROR_PARSE: i64 = -32700;
pub const ERROR_INVALID_REQUEST: i64 = -32600;
pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERROR_INVALID_PARAMS: i64 = -32602;

pub fn parse_error() -> JsonRpcResponse {
    JsonRpcResponse::Error(JsonRpcErrorResponse::new(None, ERROR_PARSE, "invalid json", None))
}

pub fn invalid_request(id: Option<Value>, message: impl Into<String>, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::Error(JsonRpcErrorResponse::new(
        id,
        ERROR_INVALID_REQUEST,
        message,
        data,
    ))
}

pub fn method_not_found(id: Option<Value>, method: &str) -> JsonRpcResponse {
    JsonRpcResponse::Error(JsonRpcErrorResponse::new(
        id,
        ERROR_METHOD_NOT_FOUND,
        format!("method '{method}' not found"),
        None,
    ))
}

pub fn invalid_params(id: Option<Value>, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::Error(JsonRpcErrorResponse::new(
        id,
        ERROR_INVALID_PARAMS,
        message,
        None,
    ))
}

/// Failure of a single MCP method, mapped onto a JSON-RPC error code.
#[derive(Debug)]
pub enum McpError {
    Invalid(String),
}

impl McpError {
    pub fn invalid(message: impl Into<String>) -> Self {
        McpError::Invalid(message.into())
    }

    pub fn into_response(self, id: Option<Value>) -> JsonRpcResponse {
        match self {
            McpError::Invalid(message) => invalid_params(id, message),
        }
    }
}
