//! Thin wrappers over the handful of Unix process calls the supervisor needs.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
    Kill,
}

impl Signal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Interrupt => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Interrupt => "SIGINT",
            Signal::Kill => "SIGKILL",
        }
    }
}

/// Deliver `signal` to `pid`. `ESRCH` surfaces as an error like any other;
/// callers decide whether a vanished target matters.
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = to_pid(pid)?;
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// True while `pid` names a process we could signal (zombies included).
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = to_pid(pid) else {
        return false;
    };
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub fn is_no_such_process(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

pub fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

/// Poll `child` until it exits or `timeout` elapses.
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL.min(deadline - now));
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL and reap.
pub fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    if let Err(err) = send_signal(child.id(), Signal::Terminate) {
        if !is_no_such_process(&err) {
            return Err(err);
        }
    }
    if let Some(status) = wait_with_timeout(child, grace)? {
        return Ok(status);
    }
    tracing::warn!(pid = child.id(), "process ignored SIGTERM, sending SIGKILL");
    child.kill()?;
    child.wait()
}

/// Restore the default disposition for `signal` and deliver it to ourselves,
/// so the exit status reports the signal rather than a clean exit.
pub fn reraise(signal: Signal) -> io::Result<()> {
    unsafe {
        if libc::signal(signal.as_raw(), libc::SIG_DFL) == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        if libc::raise(signal.as_raw()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn to_pid(pid: u32) -> io::Result<libc::pid_t> {
    // 0 and negative values address process groups; never allow them here.
    match libc::pid_t::try_from(pid) {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        )),
    }
}
