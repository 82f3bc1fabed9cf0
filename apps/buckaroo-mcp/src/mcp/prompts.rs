use serde_json::{Value, json};

use super::protocol::McpError;

const VIEW_PROMPT: &str = "view";

pub fn list() -> Value {
    json!({
        "prompts": [{
            "name": VIEW_PROMPT,
            "description": "View a data file in the interactive Buckaroo table",
            "arguments": [{
                "name": "path",
                "description": "Path to a CSV, TSV, Parquet, or JSON file",
                "required": true,
            }]
        }]
    })
}

pub fn get(params: &Value) -> Result<Value, McpError> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    if name != VIEW_PROMPT {
        return Err(McpError::invalid(format!("unknown prompt '{name}'")));
    }
    let path = params
        .pointer("/arguments/path")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid("path required"))?;
    Ok(json!({
        "messages": [{
            "role": "user",
            "content": {
                "type": "text",
                "text": format!("Use the view_data tool to load and display the file at {path}"),
            }
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_prompt_names_the_file() {
        let result = get(&json!({"name": "view", "arguments": {"path": "/data/sales.parquet"}}))
            .unwrap();
        assert_eq!(
            result["messages"][0]["content"]["text"],
            "Use the view_data tool to load and display the file at /data/sales.parquet"
        );
    }

    #[test]
    fn view_prompt_requires_path() {
        assert!(get(&json!({"name": "view"})).is_err());
        assert!(get(&json!({"name": "other", "arguments": {"path": "x"}})).is_err());
    }
}
