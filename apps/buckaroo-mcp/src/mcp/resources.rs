//! The HTML panel MCP hosts render next to a view tool result.

use serde_json::{Value, json};

use super::protocol::McpError;

pub const PANEL_URI: &str = "ui://buckaroo/view.html";
pub const PANEL_MIME: &str = "text/html;profile=mcp-app";

const PANEL_NAME: &str = "Buckaroo table viewer";
const PANEL_HTML: &str = include_str!("panel.html");

pub fn list() -> Value {
    json!({
        "resources": [{
            "uri": PANEL_URI,
            "name": PANEL_NAME,
            "mimeType": PANEL_MIME,
        }]
    })
}

pub fn read(params: &Value) -> Result<Value, McpError> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid("uri required"))?;
    if uri != PANEL_URI {
        return Err(McpError::invalid(format!("unknown resource '{uri}'")));
    }
    Ok(json!({
        "contents": [{
            "uri": PANEL_URI,
            "mimeType": PANEL_MIME,
            "text": PANEL_HTML,
        }]
    }))
}
