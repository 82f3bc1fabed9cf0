#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use buckaroo_mcp::service::ServiceClient;
use buckaroo_mcp::supervisor::{ServiceLauncher, Supervisor, SupervisorConfig, Timings};

/// What the fake data server answers with. Tests mutate it directly.
#[derive(Debug)]
pub struct FakeState {
    pub up: bool,
    pub version: String,
    pub pid: Option<u32>,
    pub static_files: Value,
    pub diagnostics: Option<Value>,
    pub load_status: StatusCode,
    pub load_body: String,
    pub loads: Vec<Value>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            up: false,
            version: "1.0.0".into(),
            pid: None,
            static_files: json!({"standalone.js": {"exists": true, "size_bytes": 2048}}),
            diagnostics: None,
            load_status: StatusCode::OK,
            load_body: json!({
                "rows": 1500,
                "columns": [
                    {"name": "city", "dtype": "object"},
                    {"name": "population", "dtype": "int64"}
                ],
                "browser_action": "opened"
            })
            .to_string(),
            loads: Vec::new(),
        }
    }
}

pub type SharedState = Arc<Mutex<FakeState>>;

pub struct FakeService {
    pub addr: SocketAddr,
    pub state: SharedState,
}

impl FakeService {
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(FakeState::default()));
        let router = Router::new()
            .route("/health", get(health))
            .route("/diagnostics", get(diagnostics))
            .route("/load", post(load))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake service");
        let addr = listener.local_addr().expect("fake service addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.addr.port())
    }

    pub fn client(&self) -> ServiceClient {
        ServiceClient::new(self.url())
    }

    pub fn update(&self, edit: impl FnOnce(&mut FakeState)) {
        edit(&mut self.state.lock().unwrap());
    }
}

async fn health(State(state): State<SharedState>) -> Response {
    let state = state.lock().unwrap();
    if !state.up {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "status": "ok",
        "pid": state.pid,
        "uptime_s": 1.5,
        "version": state.version,
        "static_files": state.static_files,
    }))
    .into_response()
}

async fn diagnostics(State(state): State<SharedState>) -> Response {
    let state = state.lock().unwrap();
    match &state.diagnostics {
        Some(body) if state.up => Json(body.clone()).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn load(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    state.loads.push(body);
    (
        state.load_status,
        [("content-type", "application/json")],
        state.load_body.clone(),
    )
        .into_response()
}

/// Stands in for the interpreter: spawns `sleep` and, when `comes_up` is
/// set, makes the fake service answer as the freshly started process.
pub struct SleepLauncher {
    state: SharedState,
    comes_up: bool,
    version: Arc<Mutex<String>>,
    launches: Arc<AtomicUsize>,
}

impl SleepLauncher {
    pub fn new(state: SharedState, version: &str) -> Self {
        Self {
            state,
            comes_up: true,
            version: Arc::new(Mutex::new(version.to_string())),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A service that never answers health checks.
    pub fn never_ready(state: SharedState) -> Self {
        Self {
            comes_up: false,
            ..Self::new(state, "never")
        }
    }

    pub fn launches(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.launches)
    }

    /// Version the next launched service will report.
    pub fn version(&self) -> Arc<Mutex<String>> {
        Arc::clone(&self.version)
    }
}

impl ServiceLauncher for SleepLauncher {
    fn launch(&self, stdout: Stdio, stderr: Stdio) -> io::Result<Child> {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.comes_up {
            let mut state = self.state.lock().unwrap();
            state.up = true;
            state.version = self.version.lock().unwrap().clone();
            state.pid = Some(child.id());
        }
        Ok(child)
    }

    fn describe(&self) -> String {
        "sleep 30".into()
    }
}

pub fn fast_timings() -> Timings {
    Timings {
        probe_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
        startup_attempts: 10,
        graceful_stop: Duration::from_secs(2),
        watchdog_stop: Duration::from_secs(2),
        mismatch_grace: Duration::from_millis(100),
        kill_settle: Duration::from_millis(100),
        orphan_poll: Duration::from_millis(50),
    }
}

pub fn supervisor_config(log_dir: &Path, port: u16) -> SupervisorConfig {
    SupervisorConfig {
        port,
        interpreter: "python3".into(),
        log_dir: log_dir.to_path_buf(),
        server_log: log_dir.join("server.log"),
        supervisor_log: log_dir.join("mcp_tool.log"),
        manual_start_command: format!("python3 -m buckaroo.server --no-browser --port {port}"),
        watchdog_program: env!("CARGO_BIN_EXE_buckaroo-mcp").into(),
        timings: fast_timings(),
    }
}

pub fn supervisor(
    service: &FakeService,
    log_dir: &Path,
    launcher: impl ServiceLauncher + 'static,
) -> Supervisor {
    Supervisor::new(
        supervisor_config(log_dir, service.addr.port()),
        service.client(),
        Box::new(launcher),
    )
}

pub fn wait_for_exit(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if let Ok(Some(status)) = child.try_wait() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}
