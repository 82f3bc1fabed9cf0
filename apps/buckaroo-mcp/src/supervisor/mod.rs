//! Lifecycle supervision for the backing data server.
//!
//! One `Supervisor` per process. It guarantees a single, correctly versioned
//! service is answering before a load is forwarded, and that a service it
//! started dies with it: through `shutdown` on ordinary exit paths, and
//! through the pipe watchdog when no code gets to run at all.

pub mod launcher;
pub mod orphan;
pub mod process;
pub mod signals;
pub mod version;
pub mod watchdog;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{HealthReport, ServiceClient};

pub use launcher::{CommandLauncher, ServiceHandle, ServiceLauncher};
pub use orphan::OrphanDetector;
pub use watchdog::WatchdogHandle;

use process::Signal;

const LOG_TAIL_LINES: usize = 20;

/// Every delay the supervisor uses. Production values are the defaults.
#[derive(Clone, Debug)]
pub struct Timings {
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub startup_attempts: u32,
    pub graceful_stop: Duration,
    pub watchdog_stop: Duration,
    pub mismatch_grace: Duration,
    pub kill_settle: Duration,
    pub orphan_poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
            startup_attempts: 20,
            graceful_stop: Duration::from_secs(3),
            watchdog_stop: Duration::from_secs(2),
            mismatch_grace: Duration::from_secs(1),
            kill_settle: Duration::from_millis(500),
            orphan_poll: Duration::from_secs(1),
        }
    }
}

impl Timings {
    pub fn startup_budget(&self) -> Duration {
        self.poll_interval * self.startup_attempts
    }
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub port: u16,
    pub interpreter: String,
    pub log_dir: PathBuf,
    pub server_log: PathBuf,
    pub supervisor_log: PathBuf,
    pub manual_start_command: String,
    pub watchdog_program: PathBuf,
    pub timings: Timings,
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.port,
            interpreter: config.python.clone(),
            log_dir: config.log_dir.clone(),
            server_log: config.server_log(),
            supervisor_log: config.supervisor_log(),
            manual_start_command: config.manual_start_command(),
            watchdog_program: watchdog::default_program(),
            timings: Timings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerStatus {
    Reused,
    Started,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Reused => "reused",
            ServerStatus::Started => "started",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct EnsureOutcome {
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub uptime_s: f64,
    pub version: String,
    /// Static assets the service reported as missing or empty on start.
    pub missing_static_assets: Vec<String>,
}

impl EnsureOutcome {
    fn from_report(status: ServerStatus, report: &HealthReport) -> Self {
        let missing_static_assets = match status {
            ServerStatus::Started => report.missing_static_assets(),
            ServerStatus::Reused => Vec::new(),
        };
        Self {
            status,
            pid: report.pid,
            uptime_s: report.uptime_s,
            version: report.version().to_string(),
            missing_static_assets,
        }
    }
}

/// Everything a user needs to debug a service that never came up.
#[derive(Clone, Debug)]
pub struct StartupFailure {
    pub service_url: String,
    pub port: u16,
    pub interpreter: String,
    pub log_dir: PathBuf,
    pub server_log: PathBuf,
    pub supervisor_log: PathBuf,
    pub log_tail: String,
    pub manual_start_command: String,
}

impl StartupFailure {
    pub fn collect(config: &SupervisorConfig, service_url: &str) -> Self {
        Self {
            service_url: service_url.to_string(),
            port: config.port,
            interpreter: config.interpreter.clone(),
            log_dir: config.log_dir.clone(),
            server_log: config.server_log.clone(),
            supervisor_log: config.supervisor_log.clone(),
            log_tail: launcher::read_log_tail(&config.server_log, LOG_TAIL_LINES),
            manual_start_command: config.manual_start_command.clone(),
        }
    }
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buckaroo data server failed to start.")?;
        writeln!(f)?;
        writeln!(f, "## Diagnostic info")?;
        writeln!(f, "- Python: {}", self.interpreter)?;
        writeln!(f, "- Server URL: {}", self.service_url)?;
        writeln!(f, "- Log dir: {}", self.log_dir.display())?;
        writeln!(f)?;
        writeln!(f, "## Server log (last {LOG_TAIL_LINES} lines)")?;
        writeln!(f, "```\n{}\n```", self.log_tail)?;
        writeln!(f)?;
        writeln!(f, "## What to check")?;
        writeln!(
            f,
            "1. Is port {port} already in use? (`lsof -i :{port}`)",
            port = self.port
        )?;
        writeln!(
            f,
            "2. Check the full server log: `cat {}`",
            self.server_log.display()
        )?;
        writeln!(
            f,
            "3. Check the MCP tool log: `cat {}`",
            self.supervisor_log.display()
        )?;
        writeln!(
            f,
            "4. Try starting the server manually: `{}`",
            self.manual_start_command
        )
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("{0}")]
    StartupTimeout(Box<StartupFailure>),
    #[error("failed to launch service: {0}")]
    Launch(#[source] io::Error),
}

pub struct Supervisor {
    config: SupervisorConfig,
    client: ServiceClient,
    launcher: Box<dyn ServiceLauncher>,
    service: Mutex<Option<ServiceHandle>>,
    watchdog: Mutex<Option<WatchdogHandle>>,
    launch_lock: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        client: ServiceClient,
        launcher: Box<dyn ServiceLauncher>,
    ) -> Self {
        Self {
            config,
            client,
            launcher,
            service: Mutex::new(None),
            watchdog: Mutex::new(None),
            launch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn owned_service_pid(&self) -> Option<u32> {
        self.service.lock().as_ref().map(ServiceHandle::pid)
    }

    pub fn watchdog_pid(&self) -> Option<u32> {
        self.watchdog.lock().as_ref().map(WatchdogHandle::pid)
    }

    pub async fn probe(&self) -> Option<HealthReport> {
        self.client
            .health(self.config.timings.probe_timeout)
            .await
    }

    pub fn startup_failure(&self) -> StartupFailure {
        StartupFailure::collect(&self.config, self.client.base_url())
    }

    /// Make sure a service reporting `expected_version` is answering,
    /// starting (or replacing) one if needed. Safe to call repeatedly.
    pub async fn ensure_running(
        &self,
        expected_version: &str,
    ) -> Result<EnsureOutcome, SupervisorError> {
        let _launch = self.launch_lock.lock().await;

        if let Some(report) = self.probe().await {
            if report.version() == expected_version {
                info!(
                    version = report.version(),
                    pid = ?report.pid,
                    uptime_s = report.uptime_s,
                    "service already running"
                );
                return Ok(EnsureOutcome::from_report(ServerStatus::Reused, &report));
            }
            info!(
                running = report.version(),
                expected = expected_version,
                pid = ?report.pid,
                "version mismatch, replacing service"
            );
            self.retire_mismatched(report.pid).await;
        }

        // Whatever we launched before is stale now.
        self.release_owned().await;
        self.launch()?;
        self.await_ready().await
    }

    /// Best-effort teardown of a service answering with the wrong version.
    /// Never fails: a survivor shows up later as a startup timeout.
    async fn retire_mismatched(&self, pid: Option<u32>) {
        let Some(pid) = pid else {
            warn!("mismatched service did not report a pid; starting alongside it");
            return;
        };

        let owned = {
            let mut guard = self.service.lock();
            if guard.as_ref().is_some_and(|handle| handle.pid() == pid) {
                guard.take()
            } else {
                None
            }
        };
        if let Some(handle) = owned {
            let grace = self.config.timings.graceful_stop;
            if let Err(err) = tokio::task::spawn_blocking(move || handle.terminate(grace)).await {
                warn!(pid, error = %err, "service teardown task failed");
            }
            return;
        }

        if let Err(err) = process::send_signal(pid, Signal::Terminate) {
            debug!(pid, error = %err, "kill old service error (harmless)");
            return;
        }
        tokio::time::sleep(self.config.timings.mismatch_grace).await;
        if self.probe().await.is_some() {
            warn!(pid, "old service still answering after SIGTERM, sending SIGKILL");
            if let Err(err) = process::send_signal(pid, Signal::Kill) {
                debug!(pid, error = %err, "kill old service error (harmless)");
            }
            tokio::time::sleep(self.config.timings.kill_settle).await;
        }
    }

    fn launch(&self) -> Result<(), SupervisorError> {
        let handle = ServiceHandle::launch(self.launcher.as_ref(), &self.config.server_log)
            .map_err(SupervisorError::Launch)?;
        let pid = handle.pid();
        *self.service.lock() = Some(handle);
        match watchdog::spawn(&self.config.watchdog_program, pid, &self.config.log_dir) {
            Ok(watchdog) => *self.watchdog.lock() = Some(watchdog),
            Err(err) => warn!(
                program = %self.config.watchdog_program.display(),
                error = %err,
                "failed to start service watchdog; service may outlive an abrupt exit"
            ),
        }
        Ok(())
    }

    async fn await_ready(&self) -> Result<EnsureOutcome, SupervisorError> {
        let timings = &self.config.timings;
        let started = Instant::now();
        for _ in 0..timings.startup_attempts {
            tokio::time::sleep(timings.poll_interval).await;
            if let Some(report) = self.probe().await {
                let outcome = EnsureOutcome::from_report(ServerStatus::Started, &report);
                info!(
                    after_ms = started.elapsed().as_millis() as u64,
                    pid = ?report.pid,
                    version = report.version(),
                    "service ready"
                );
                if !outcome.missing_static_assets.is_empty() {
                    warn!(
                        missing = ?outcome.missing_static_assets,
                        "static files missing or empty, pages may be blank"
                    );
                }
                return Ok(outcome);
            }
        }
        error!(
            budget_ms = timings.startup_budget().as_millis() as u64,
            log = %self.config.server_log.display(),
            "service failed to start"
        );
        Err(SupervisorError::StartupTimeout(Box::new(
            self.startup_failure(),
        )))
    }

    fn take_handles(&self) -> (Option<ServiceHandle>, Option<WatchdogHandle>) {
        let service = self.service.lock().take();
        let watchdog = self.watchdog.lock().take();
        (service, watchdog)
    }

    async fn release_owned(&self) {
        let (service, watchdog) = self.take_handles();
        if service.is_none() && watchdog.is_none() {
            return;
        }
        let timings = self.config.timings.clone();
        if let Err(err) =
            tokio::task::spawn_blocking(move || teardown(service, watchdog, &timings)).await
        {
            warn!(error = %err, "service teardown task failed");
        }
    }

    /// Stop the service and watchdog we own. Idempotent: each handle is
    /// taken before it is acted on, so later or concurrent calls find nothing.
    pub fn shutdown(&self) {
        let (service, watchdog) = self.take_handles();
        teardown(service, watchdog, &self.config.timings);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn teardown(service: Option<ServiceHandle>, watchdog: Option<WatchdogHandle>, timings: &Timings) {
    if let Some(service) = service {
        debug!(pid = service.pid(), uptime_s = service.uptime().as_secs(), "releasing service");
        service.terminate(timings.graceful_stop);
    }
    if let Some(watchdog) = watchdog {
        watchdog.stop(timings.watchdog_stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SupervisorConfig {
        SupervisorConfig {
            port: 8700,
            interpreter: "python3".into(),
            log_dir: PathBuf::from("/tmp/buckaroo-test/logs"),
            server_log: PathBuf::from("/tmp/buckaroo-test/logs/server.log"),
            supervisor_log: PathBuf::from("/tmp/buckaroo-test/logs/mcp_tool.log"),
            manual_start_command: "python3 -m buckaroo.server --no-browser --port 8700".into(),
            watchdog_program: PathBuf::from("buckaroo-mcp"),
            timings: Timings::default(),
        }
    }

    #[test]
    fn default_startup_budget_is_five_seconds() {
        assert_eq!(Timings::default().startup_budget(), Duration::from_secs(5));
    }

    #[test]
    fn startup_failure_renders_actionable_text() {
        let mut failure = StartupFailure::collect(&sample_config(), "http://localhost:8700");
        failure.log_tail = "Traceback: address already in use".into();
        let text = failure.to_string();
        assert!(text.starts_with("Buckaroo data server failed to start."));
        assert!(text.contains("- Server URL: http://localhost:8700"));
        assert!(text.contains("Traceback: address already in use"));
        assert!(text.contains("`lsof -i :8700`"));
        assert!(text.contains("`cat /tmp/buckaroo-test/logs/server.log`"));
        assert!(text.contains("python3 -m buckaroo.server --no-browser --port 8700"));
    }

    #[test]
    fn reused_outcome_skips_asset_check() {
        let report: HealthReport = serde_json::from_value(serde_json::json!({
            "status": "ok",
            "pid": 501,
            "version": "1.2.0",
            "static_files": {"standalone.js": {"exists": false, "size_bytes": 0}}
        }))
        .unwrap();
        let reused = EnsureOutcome::from_report(ServerStatus::Reused, &report);
        assert!(reused.missing_static_assets.is_empty());
        let started = EnsureOutcome::from_report(ServerStatus::Started, &report);
        assert_eq!(started.missing_static_assets, vec!["standalone.js".to_string()]);
        assert_eq!(started.status.to_string(), "started");
    }

    #[test]
    fn shutdown_without_handles_is_a_noop() {
        let supervisor = Supervisor::new(
            sample_config(),
            ServiceClient::new("http://localhost:8700"),
            Box::new(CommandLauncher::new("true", Vec::new())),
        );
        supervisor.shutdown();
        supervisor.shutdown();
        assert!(supervisor.owned_service_pid().is_none());
    }
}
