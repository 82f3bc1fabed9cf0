use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::process;

/// Starts the backing service process. The supervisor owns everything
/// around the spawn (log redirection, watchdog, readiness polling).
pub trait ServiceLauncher: Send + Sync {
    fn launch(&self, stdout: Stdio, stderr: Stdio) -> io::Result<Child>;

    /// Human-readable command line, for logs.
    fn describe(&self) -> String;
}

/// Launches `program args...`, e.g. `python3 -m buckaroo.server --port 8700`.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl ServiceLauncher for CommandLauncher {
    fn launch(&self, stdout: Stdio, stderr: Stdio) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A service process this supervisor started and must tear down.
#[derive(Debug)]
pub struct ServiceHandle {
    child: Child,
    launched_at: Instant,
}

impl ServiceHandle {
    /// Spawn through `launcher`, appending stdout and stderr to `log_path`.
    pub fn launch(launcher: &dyn ServiceLauncher, log_path: &Path) -> io::Result<Self> {
        let log = open_append(log_path)?;
        let stderr = log.try_clone()?;
        info!(command = %launcher.describe(), log = %log_path.display(), "starting service");
        let child = launcher.launch(Stdio::from(log), Stdio::from(stderr))?;
        Ok(Self {
            child,
            launched_at: Instant::now(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn uptime(&self) -> Duration {
        self.launched_at.elapsed()
    }

    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Graceful stop, escalating to SIGKILL after `grace`. A process that
    /// is already gone is not an error.
    pub fn terminate(mut self, grace: Duration) {
        let pid = self.pid();
        if self.has_exited() {
            debug!(pid, "service already exited");
            return;
        }
        info!(pid, "shutting down service");
        match process::terminate_child(&mut self.child, grace) {
            Ok(status) => debug!(pid, %status, "service stopped"),
            Err(err) => debug!(pid, error = %err, "service cleanup error (harmless)"),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Last `lines` lines of `path`, or a placeholder when it cannot be read.
pub fn read_log_tail(path: &Path, lines: usize) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let all: Vec<&str> = contents.lines().collect();
            let start = all.len().saturating_sub(lines);
            all[start..].join("\n")
        }
        Err(_) => "(server log not found)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_appends_output_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("server.log");
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "previous run\n").unwrap();

        let launcher = CommandLauncher::new("sh", vec!["-c".into(), "echo ready; echo oops >&2".into()]);
        let mut handle = ServiceHandle::launch(&launcher, &log).unwrap();
        process::wait_with_timeout(&mut handle.child, Duration::from_secs(5))
            .unwrap()
            .expect("sh exits");

        let contents = fs::read_to_string(&log).unwrap();
        assert!(contents.starts_with("previous run\n"));
        assert!(contents.contains("ready"));
        assert!(contents.contains("oops"));
        assert!(handle.has_exited());
    }

    #[test]
    fn terminate_is_quiet_for_exited_process() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = CommandLauncher::new("true", Vec::new());
        let mut handle = ServiceHandle::launch(&launcher, &dir.path().join("server.log")).unwrap();
        process::wait_with_timeout(&mut handle.child, Duration::from_secs(5)).unwrap();
        handle.terminate(Duration::from_millis(100));
    }

    #[test]
    fn describe_joins_program_and_args() {
        let launcher = CommandLauncher::new("python3", vec!["-m".into(), "buckaroo.server".into()]);
        assert_eq!(launcher.describe(), "python3 -m buckaroo.server");
    }

    #[test]
    fn log_tail_keeps_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        fs::write(&log, "one\ntwo\nthree\nfour\n").unwrap();
        assert_eq!(read_log_tail(&log, 2), "three\nfour");
        assert_eq!(
            read_log_tail(&dir.path().join("missing.log"), 5),
            "(server log not found)"
        );
    }
}
