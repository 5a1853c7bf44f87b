use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::config::ToolchainConfig;

/// Presence check for the pause marker.
pub trait Sentinel: Send + Sync {
    fn is_present(&self) -> bool;
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Marker file on disk.
#[derive(Debug, Clone)]
pub struct FileSentinel {
    path: PathBuf,
}

impl FileSentinel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sentinel for FileSentinel {
    fn is_present(&self) -> bool {
        self.path.exists()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Number of sleeps taken before the marker disappeared.
    pub pauses: u32,
}

/// Holds back new work items while the sentinel is present. Items already
/// running are never consulted.
pub struct BlockingGate {
    sentinel: Box<dyn Sentinel>,
    sleeper: Box<dyn Sleeper>,
    interval: Duration,
}

impl BlockingGate {
    pub fn new(
        sentinel: impl Sentinel + 'static,
        sleeper: impl Sleeper + 'static,
        interval: Duration,
    ) -> Self {
        Self {
            sentinel: Box::new(sentinel),
            sleeper: Box::new(sleeper),
            interval,
        }
    }

    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self::new(
            FileSentinel::new(&config.block_file),
            ThreadSleeper,
            config.block_poll_interval(),
        )
    }

    pub fn wait(&self) -> GateReport {
        let mut report = GateReport::default();
        while self.sentinel.is_present() {
            if report.pauses == 0 {
                info!("Waiting to unblock");
            }
            report.pauses += 1;
            self.sleeper.sleep(self.interval);
        }
        if report.pauses > 0 {
            info!(pauses = report.pauses, "Unblocked");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Present for the first `remaining` checks.
    struct Countdown(Arc<AtomicU32>);

    impl Sentinel for Countdown {
        fn is_present(&self) -> bool {
            self.0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    struct Recorder(Arc<AtomicU32>);

    impl Sleeper for Recorder {
        fn sleep(&self, duration: Duration) {
            assert_eq!(duration, Duration::from_secs(60));
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn polls_until_marker_disappears() {
        let sleeps = Arc::new(AtomicU32::new(0));
        let gate = BlockingGate::new(
            Countdown(Arc::new(AtomicU32::new(3))),
            Recorder(sleeps.clone()),
            Duration::from_secs(60),
        );
        assert_eq!(gate.wait(), GateReport { pauses: 3 });
        assert_eq!(sleeps.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn absent_marker_passes_immediately() {
        let temp = tempdir().unwrap();
        let gate = BlockingGate::new(
            FileSentinel::new(temp.path().join("block.txt")),
            ThreadSleeper,
            Duration::from_secs(60),
        );
        assert_eq!(gate.wait().pauses, 0);
    }
}
