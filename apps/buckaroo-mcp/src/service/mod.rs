//! HTTP client for the backing data server.
//!
//! The server is an opaque dependency; this module only knows the shape of
//! `/health`, `/diagnostics` and `/load`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(5);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Version string used when the service does not report one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Liveness payload returned by `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub uptime_s: f64,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub static_files: BTreeMap<String, StaticAsset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAsset {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub size_bytes: u64,
}

impl StaticAsset {
    pub fn is_usable(&self) -> bool {
        self.exists && self.size_bytes > 0
    }
}

impl HealthReport {
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(UNKNOWN_VERSION)
    }

    /// Assets that are absent or zero-length; either one means a blank UI.
    pub fn missing_static_assets(&self) -> Vec<String> {
        self.static_files
            .iter()
            .filter(|(_, asset)| !asset.is_usable())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Extended payload returned by `GET /diagnostics`. Every field is optional
/// because older servers report less.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Diagnostics {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub uptime_s: Option<f64>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub python_executable: Option<String>,
    #[serde(default)]
    pub buckaroo_version: Option<String>,
    #[serde(default)]
    pub tornado_version: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub static_files: BTreeMap<String, StaticAsset>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, bool>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub static_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest<'a> {
    pub session: &'a str,
    pub path: &'a str,
    pub mode: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadResponse {
    pub rows: u64,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub browser_action: Option<String>,
    #[serde(default)]
    pub server_pid: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("invalid response from {url}: {message}; body: {body}")]
    InvalidResponse {
        url: String,
        message: String,
        body: String,
    },
}

#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        // No proxy: the service is always local, and a configured proxy
        // would turn "not running" into a hang.
        let client = Client::builder()
            .connect_timeout(HEALTH_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the interactive view for `session`.
    pub fn session_url(&self, session: &str) -> String {
        format!("{}/s/{session}", self.base_url)
    }

    /// Probe `/health`. Any failure means "not running" and yields `None`.
    pub async fn health(&self, timeout: Duration) -> Option<HealthReport> {
        let url = format!("{}/health", self.base_url);
        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%url, error = %err, "health check failed");
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "health check returned non-200");
            return None;
        }
        match response.json::<HealthReport>().await {
            Ok(report) => {
                debug!(?report, "health check ok");
                Some(report)
            }
            Err(err) => {
                debug!(%url, error = %err, "health body malformed");
                None
            }
        }
    }

    /// Fetch `/diagnostics`; absent on any failure, like `/health`.
    pub async fn diagnostics(&self) -> Option<Diagnostics> {
        let url = format!("{}/diagnostics", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(DIAGNOSTICS_TIMEOUT)
            .send()
            .await
            .ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        response.json::<Diagnostics>().await.ok()
    }

    /// Ask the service to load `request.path` into `request.session`.
    ///
    /// Failures keep the remote body so the caller can show it verbatim.
    pub async fn load(&self, request: &LoadRequest<'_>) -> Result<LoadResponse, ServiceError> {
        let url = format!("{}/load", self.base_url);
        debug!(%url, ?request, "posting load request");
        let response = self
            .client
            .post(&url)
            .timeout(LOAD_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|source| ServiceError::Network {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ServiceError::Network {
                url: url.clone(),
                source,
            })?;
        debug!(%status, body = %truncate(&body, 500), "load response");
        if !status.is_success() {
            return Err(ServiceError::Status { url, status, body });
        }
        serde_json::from_str(&body).map_err(|err| ServiceError::InvalidResponse {
            url,
            message: err.to_string(),
            body,
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
