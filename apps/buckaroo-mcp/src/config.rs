use std::env;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8700;
const DEFAULT_PYTHON: &str = "python3";
const SERVICE_MODULE: &str = "buckaroo.server";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BUCKAROO_PORT must be a port number, got {0:?}")]
    InvalidPort(String),
}

/// Runtime configuration for the MCP shim and the service it supervises.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the backing data server listens on.
    pub port: u16,
    /// Directory holding `mcp_tool.log` and `server.log`.
    pub log_dir: PathBuf,
    /// Interpreter used to run the backing service module.
    pub python: String,
    /// Pins the version the running service must report; discovered from
    /// the installed package when unset.
    pub expected_version: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("BUCKAROO_PORT") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            _ => DEFAULT_PORT,
        };
        let log_dir = env::var_os("BUCKAROO_LOG_DIR")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);
        let python = env::var("BUCKAROO_PYTHON")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string());
        let expected_version = env::var("BUCKAROO_EXPECTED_VERSION")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Ok(Self {
            port,
            log_dir,
            python,
            expected_version,
        })
    }

    pub fn service_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn server_log(&self) -> PathBuf {
        self.log_dir.join("server.log")
    }

    pub fn supervisor_log(&self) -> PathBuf {
        self.log_dir.join("mcp_tool.log")
    }

    /// Arguments passed to the interpreter when the supervisor launches the service.
    pub fn service_args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            SERVICE_MODULE.to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ]
    }

    /// What a user should run to start the service by hand.
    pub fn manual_start_command(&self) -> String {
        format!(
            "{} -m {SERVICE_MODULE} --no-browser --port {}",
            self.python, self.port
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_dir: default_log_dir(),
            python: DEFAULT_PYTHON.to_string(),
            expected_version: None,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".buckaroo").join("logs")
}
