//! Pipe-triggered watchdog.
//!
//! The supervisor spawns `<exe> watchdog --pid <service pid>` with a piped
//! stdin and never writes to it. The watchdog blocks until that pipe reaches
//! end-of-stream, which the kernel guarantees once every write end is closed:
//! supervisor exit, panic, or SIGKILL alike. It then sends SIGTERM to the
//! service and exits.

use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::process::{self, Signal};

pub const SUBCOMMAND: &str = "watchdog";

#[derive(Debug)]
pub struct WatchdogHandle {
    child: Child,
    target: u32,
    pipe: Option<ChildStdin>,
}

impl WatchdogHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Close our end of the pipe. The watchdog fires as soon as this happens.
    pub fn close_pipe(&mut self) {
        self.pipe.take();
    }

    /// Tear the watchdog down, force-killing it if it outlives `timeout`.
    /// The pipe stays open until the watchdog is reaped so it cannot fire
    /// at a service pid that has already been recycled.
    pub fn stop(mut self, timeout: Duration) {
        if let Err(err) = process::send_signal(self.pid(), Signal::Terminate) {
            if !process::is_no_such_process(&err) {
                debug!(pid = self.pid(), error = %err, "watchdog signal failed");
            }
        }
        match process::wait_with_timeout(&mut self.child, timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(err) => debug!(pid = self.pid(), error = %err, "watchdog wait failed"),
        }
        self.close_pipe();
    }

    /// Wait for the watchdog to exit on its own (after `close_pipe`).
    pub fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        Ok(process::wait_with_timeout(&mut self.child, timeout)?.is_some())
    }
}

/// Where the watchdog binary lives; defaults to our own executable.
pub fn default_program() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("buckaroo-mcp"))
}

/// Spawn a watchdog that terminates `service_pid` once our pipe closes.
/// It logs into `log_dir`, next to the supervisor's own log.
pub fn spawn(program: &Path, service_pid: u32, log_dir: &Path) -> io::Result<WatchdogHandle> {
    let mut child = Command::new(program)
        .arg(SUBCOMMAND)
        .arg("--pid")
        .arg(service_pid.to_string())
        .env("BUCKAROO_LOG_DIR", log_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // own process group: a Ctrl-C aimed at the supervisor's group must
        // not take the watchdog down before it can act
        .process_group(0)
        .spawn()?;
    let pipe = child.stdin.take();
    info!(
        watchdog = child.id(),
        service = service_pid,
        "started service watchdog"
    );
    Ok(WatchdogHandle {
        child,
        target: service_pid,
        pipe,
    })
}

/// Watchdog process body: block until stdin closes, then stop `service_pid`.
pub fn run(service_pid: u32) -> io::Result<()> {
    run_with(io::stdin().lock(), service_pid)
}

fn run_with(mut input: impl Read, service_pid: u32) -> io::Result<()> {
    debug!(service = service_pid, "watchdog waiting for supervisor pipe to close");
    // Nothing is ever written; data would be discarded anyway.
    io::copy(&mut input, &mut io::sink())?;
    match process::send_signal(service_pid, Signal::Terminate) {
        Ok(()) => info!(service = service_pid, "supervisor gone, terminated service"),
        Err(err) if process::is_no_such_process(&err) => {
            debug!(service = service_pid, "service already gone")
        }
        Err(err) => warn!(service = service_pid, error = %err, "failed to signal service"),
    }
    Ok(())
}
