//! Tool catalogue and handlers.
//!
//! Failures the assistant should read (server did not start, load rejected)
//! come back as `isError` results; only malformed calls become JSON-RPC errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::protocol::McpError;
use super::resources::PANEL_URI;
use super::summary::{self, LoadSummary};
use crate::config::Config;
use crate::service::LoadRequest;
use crate::supervisor::{Supervisor, SupervisorError, version};

pub const VIEW_DATA: &str = "view_data";
pub const BUCKAROO_TABLE: &str = "buckaroo_table";
pub const DIAGNOSTICS: &str = "buckaroo_diagnostics";

const LOAD_MODE: &str = "buckaroo";
const SESSION_ID_LEN: usize = 12;

const VIEW_DESCRIPTION: &str = "Load a tabular data file (CSV, TSV, Parquet, JSON) in Buckaroo \
for interactive viewing. Opens an interactive table UI in the browser with sorting, filtering, \
and summary statistics. Returns a text summary of the dataset.";
const DIAGNOSTICS_DESCRIPTION: &str = "Check the health of the Buckaroo data server: version, \
static assets, dependencies and log locations. Use when view_data fails.";

pub fn list() -> Value {
    json!({
        "tools": [
            view_descriptor(VIEW_DATA, VIEW_DESCRIPTION),
            view_descriptor(
                BUCKAROO_TABLE,
                "Alias of view_data. Open a data file in the interactive Buckaroo table.",
            ),
            {
                "name": DIAGNOSTICS,
                "description": DIAGNOSTICS_DESCRIPTION,
                "inputSchema": {"type": "object", "properties": {}},
            }
        ]
    })
}

fn view_descriptor(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the data file, absolute or relative to the working directory",
                }
            },
            "required": ["path"],
        },
        "_meta": {"ui": {"resourceUri": PANEL_URI}},
    })
}

/// Text returned by a tool, flagged when it describes a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn failed(text: String) -> Self {
        Self {
            text,
            is_error: true,
        }
    }

    pub fn into_value(self) -> Value {
        let mut result = json!({"content": [{"type": "text", "text": self.text}]});
        if self.is_error {
            result["isError"] = Value::Bool(true);
        }
        result
    }
}

/// Per-process state shared by every tool call.
pub struct ToolContext {
    supervisor: Arc<Supervisor>,
    config: Config,
    session_id: String,
    expected_version: OnceCell<String>,
}

impl ToolContext {
    pub fn new(supervisor: Arc<Supervisor>, config: Config) -> Self {
        let session_id = new_session_id();
        info!(session = %session_id, "tool session created");
        Self {
            supervisor,
            config,
            session_id,
            expected_version: OnceCell::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    async fn expected_version(&self) -> &str {
        self.expected_version
            .get_or_init(|| version::resolve_expected_version(&self.config))
            .await
    }

    pub async fn call(&self, name: &str, arguments: &Value) -> Result<Value, McpError> {
        let output = match name {
            VIEW_DATA | BUCKAROO_TABLE => {
                let path = arguments
                    .get("path")
                    .and_then(Value::as_str)
                    .filter(|path| !path.trim().is_empty())
                    .ok_or_else(|| McpError::invalid("path required"))?;
                self.view_data(path).await?
            }
            DIAGNOSTICS => self.diagnostics().await,
            other => return Err(McpError::invalid(format!("unknown tool '{other}'"))),
        };
        Ok(output.into_value())
    }

    pub async fn view_data(&self, path: &str) -> Result<ToolOutput, McpError> {
        let path = absolute_path(path)?;
        let path_text = path.to_string_lossy().into_owned();
        info!(path = %path_text, session = %self.session_id, "view_data called");

        let expected = self.expected_version().await.to_owned();
        let outcome = match self.supervisor.ensure_running(&expected).await {
            Ok(outcome) => outcome,
            Err(SupervisorError::StartupTimeout(failure)) => {
                return Ok(ToolOutput::failed(failure.to_string()));
            }
            Err(err @ SupervisorError::Launch(_)) => {
                error!(error = %err, "could not launch service");
                let failure = self.supervisor.startup_failure();
                return Ok(ToolOutput::failed(format!("{err}\n\n{failure}")));
            }
        };

        let request = LoadRequest {
            session: &self.session_id,
            path: &path_text,
            mode: LOAD_MODE,
        };
        let response = match self.supervisor.client().load(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(path = %path_text, error = %err, "load failed");
                return Ok(ToolOutput::failed(format!("Failed to load {path_text}: {err}")));
            }
        };
        info!(
            rows = response.rows,
            columns = response.columns.len(),
            status = %outcome.status,
            "load succeeded"
        );

        let session_url = self.supervisor.client().session_url(&self.session_id);
        let text = LoadSummary {
            path: &path,
            response: &response,
            outcome: &outcome,
            session_id: &self.session_id,
            session_url: &session_url,
        }
        .render();
        Ok(ToolOutput::ok(text))
    }

    pub async fn diagnostics(&self) -> ToolOutput {
        let Some(health) = self.supervisor.probe().await else {
            let failure = self.supervisor.startup_failure();
            return ToolOutput::ok(summary::not_running(&failure));
        };
        match self.supervisor.client().diagnostics().await {
            Some(diag) => ToolOutput::ok(summary::diagnostics_report(&diag)),
            None => ToolOutput::ok(summary::diagnostics_unavailable(&health)),
        }
    }
}

fn absolute_path(path: &str) -> Result<PathBuf, McpError> {
    std::path::absolute(Path::new(path))
        .map_err(|err| McpError::invalid(format!("invalid path {path:?}: {err}")))
}

fn new_session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}
