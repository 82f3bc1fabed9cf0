//! Parent-death detection.
//!
//! When an intermediate launcher between the assistant and us is killed, we
//! get reparented and our stdin may stay open indefinitely. Polling the
//! parent pid catches that; worst-case latency is one poll interval.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::info;

use super::process;

type ParentSource = Box<dyn Fn() -> u32 + Send>;

pub struct OrphanDetector {
    interval: Duration,
    parent: ParentSource,
}

impl OrphanDetector {
    pub fn new(interval: Duration) -> Self {
        Self::with_parent_source(interval, process::parent_pid)
    }

    pub fn with_parent_source(
        interval: Duration,
        parent: impl Fn() -> u32 + Send + 'static,
    ) -> Self {
        Self {
            interval,
            parent: Box::new(parent),
        }
    }

    /// Start polling on a background thread. `on_orphan(original, current)`
    /// runs at most once, on the first observed change; the thread then ends.
    pub fn spawn<F>(self, on_orphan: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(u32, u32) + Send + 'static,
    {
        let Self { interval, parent } = self;
        let original = parent();
        info!(ppid = original, "parent watcher started");
        thread::Builder::new()
            .name("orphan-detector".into())
            .spawn(move || {
                loop {
                    thread::sleep(interval);
                    let current = parent();
                    if current != original {
                        info!(from = original, to = current, "parent changed, cleaning up");
                        on_orphan(original, current);
                        return;
                    }
                }
            })
    }
}
