use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::service::UNKNOWN_VERSION;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_SNIPPET: &str = "import buckaroo; print(getattr(buckaroo, '__version__', 'unknown'))";

/// The version the running service must report: pinned through config, or
/// read from the package the configured interpreter would launch.
pub async fn resolve_expected_version(config: &Config) -> String {
    if let Some(pinned) = &config.expected_version {
        return pinned.clone();
    }
    match installed_version(&config.python).await {
        Some(version) => version,
        None => UNKNOWN_VERSION.to_string(),
    }
}

async fn installed_version(python: &str) -> Option<String> {
    let output = Command::new(python)
        .args(["-c", VERSION_SNIPPET])
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!(%python, error = %err, "could not run interpreter to read package version");
            return None;
        }
        Err(_) => {
            warn!(%python, "timed out reading package version");
            return None;
        }
    };
    if !output.status.success() {
        warn!(
            %python,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "package version lookup failed"
        );
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(%version, "installed package version");
    (!version.is_empty()).then_some(version)
}
