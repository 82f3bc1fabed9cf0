//! Abrupt-exit paths, driven through the real binary with a shell script
//! standing in for the interpreter.

mod support;

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use buckaroo_mcp::supervisor::process::{self, Signal};
use support::{FakeService, wait_for_exit};

/// Fake interpreter: records its pid, then idles like a server that never
/// finishes booting.
fn fake_python(dir: &Path) -> PathBuf {
    let script = dir.join("python");
    let pid_file = dir.join("service.pid");
    fs::write(
        &script,
        format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn configure(command: &mut Command, service: &FakeService, dir: &Path) {
    command
        .env("HOME", dir)
        .env("BUCKAROO_LOG_DIR", dir.join("logs"))
        .env("BUCKAROO_PORT", service.addr.port().to_string())
        .env("BUCKAROO_EXPECTED_VERSION", "1.0.0")
        .env("BUCKAROO_PYTHON", fake_python(dir))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
}

fn request_view(child: &mut Child) {
    let stdin = child.stdin.as_mut().unwrap();
    let call = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"view_data","arguments":{"path":"/data/cities.csv"}}}"#;
    writeln!(stdin, "{call}").unwrap();
    stdin.flush().unwrap();
}

fn wait_for_service_pid(dir: &Path) -> u32 {
    let pid_file = dir.join("service.pid");
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(text) = fs::read_to_string(&pid_file) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("service never launched");
}

/// Gone, or a zombie nobody has reaped yet.
fn is_gone(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| rest.starts_with('Z')),
        Err(_) => !process::is_alive(pid),
    }
}

fn wait_until_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if is_gone(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test_timeout::tokio_timeout_test(secs = 30, flavor = "multi_thread")]
async fn sigkill_of_the_server_still_stops_the_service() {
    let service = FakeService::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut command = Command::new(env!("CARGO_BIN_EXE_buckaroo-mcp"));
    configure(&mut command, &service, dir.path());
    let mut server = command.spawn().unwrap();

    request_view(&mut server);
    let service_pid = tokio::task::spawn_blocking({
        let dir = dir.path().to_path_buf();
        move || wait_for_service_pid(&dir)
    })
    .await
    .unwrap();
    assert!(!is_gone(service_pid));

    // No cleanup code runs in the server; only the watchdog can act.
    process::send_signal(server.id(), Signal::Kill).unwrap();
    server.wait().unwrap();

    let stopped =
        tokio::task::spawn_blocking(move || wait_until_gone(service_pid, Duration::from_secs(5)))
            .await
            .unwrap();
    assert!(stopped, "service {service_pid} outlived the server");
}

#[test_timeout::tokio_timeout_test(secs = 30, flavor = "multi_thread")]
async fn losing_the_parent_stops_the_service() {
    let service = FakeService::start().await;
    let dir = tempfile::tempdir().unwrap();
    // An intermediate launcher between us and the server. The explicit fd
    // keeps the background job's stdin on our pipe instead of /dev/null.
    let mut command = Command::new("sh");
    command.arg("-c").arg(format!(
        "exec 3<&0; {} <&3 & wait",
        env!("CARGO_BIN_EXE_buckaroo-mcp")
    ));
    configure(&mut command, &service, dir.path());
    let mut launcher = command.spawn().unwrap();

    request_view(&mut launcher);
    let service_pid = tokio::task::spawn_blocking({
        let dir = dir.path().to_path_buf();
        move || wait_for_service_pid(&dir)
    })
    .await
    .unwrap();

    process::send_signal(launcher.id(), Signal::Kill).unwrap();
    assert!(wait_for_exit(&mut launcher, Duration::from_secs(5)).is_some());

    let stopped =
        tokio::task::spawn_blocking(move || wait_until_gone(service_pid, Duration::from_secs(10)))
            .await
            .unwrap();
    assert!(stopped, "service {service_pid} outlived the orphaned server");
}
