use std::io;

use tokio::signal::unix::{SignalKind, signal};

use super::process::Signal;

/// Resolve with the first SIGTERM or SIGINT delivered to this process.
///
/// Installing the listeners replaces the default dispositions, so the caller
/// owns termination: clean up, then `process::reraise` the returned signal.
pub async fn wait_for_termination() -> io::Result<Signal> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => Ok(Signal::Terminate),
        _ = interrupt.recv() => Ok(Signal::Interrupt),
    }
}
