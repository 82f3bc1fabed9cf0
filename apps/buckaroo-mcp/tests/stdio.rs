mod support;

use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use buckaroo_mcp::mcp::client::McpClient;
use buckaroo_mcp::supervisor::process::{self, Signal};
use support::FakeService;

type StdioClient = McpClient<ChildStdout, ChildStdin>;

fn spawn_server(service: &FakeService, home: &Path) -> (Child, StdioClient) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_buckaroo-mcp"))
        .env("HOME", home)
        .env("BUCKAROO_LOG_DIR", home.join("logs"))
        .env("BUCKAROO_PORT", service.addr.port().to_string())
        .env("BUCKAROO_EXPECTED_VERSION", "1.0.0")
        .env("BUCKAROO_PYTHON", "/nonexistent/python")
        .env_remove("BUCKAROO_LOG_FILTER")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn buckaroo-mcp");
    let stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    (child, McpClient::new(stdout, stdin))
}

#[test_timeout::tokio_timeout_test(secs = 30, flavor = "multi_thread")]
async fn serves_the_mcp_surface_over_stdio() {
    let service = FakeService::start().await;
    service.update(|state| {
        state.up = true;
        state.pid = Some(99);
    });
    let home = tempfile::tempdir().unwrap();
    let (mut child, mut client) = spawn_server(&service, home.path());

    let init = client.initialize().await.unwrap();
    assert_eq!(init["serverInfo"]["name"], "buckaroo-table");

    let tools = client.list_tools().await.unwrap();
    let view = tools.iter().find(|tool| tool["name"] == "view_data").unwrap();
    assert_eq!(view["_meta"]["ui"]["resourceUri"], "ui://buckaroo/view.html");

    let panel = client
        .call_method("resources/read", json!({"uri": "ui://buckaroo/view.html"}))
        .await
        .unwrap();
    assert_eq!(panel["contents"][0]["mimeType"], "text/html;profile=mcp-app");

    let result = client
        .call_tool("view_data", json!({"path": "/data/cities.csv"}))
        .await
        .unwrap();
    assert!(result.get("isError").is_none(), "{result}");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("1,500 rows"));
    assert!(text.contains(&format!(
        "Interactive view: http://localhost:{}/s/",
        service.addr.port()
    )));
    assert!(text.contains("Server: pid=99 (reused)"));

    process::send_signal(child.id().unwrap(), Signal::Terminate).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("exit after SIGTERM")
        .unwrap();
    assert_eq!(status.signal(), Some(libc::SIGTERM));

    let log = std::fs::read_to_string(home.path().join("logs").join("mcp_tool.log")).unwrap();
    assert!(log.contains("buckaroo-mcp starting"));
    assert!(log.contains("exiting on signal"), "log was: {log}");
}

#[test_timeout::tokio_timeout_test(secs = 30, flavor = "multi_thread")]
async fn exits_cleanly_when_stdin_closes() {
    let service = FakeService::start().await;
    let home = tempfile::tempdir().unwrap();
    let (mut child, mut client) = spawn_server(&service, home.path());

    client.call_method("ping", json!({})).await.unwrap();
    drop(client);

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("exit after stdin closed")
        .unwrap();
    assert!(status.success(), "{status:?}");
}
