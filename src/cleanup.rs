use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Intermediate artifacts of one work item, deleted when its pipeline ends.
///
/// One instance per item, so no locking is needed.
#[derive(Debug, Default)]
pub struct CleanupManager {
    enabled: bool,
    registered: Vec<PathBuf>,
}

impl CleanupManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            registered: Vec::new(),
        }
    }

    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.registered.push(path.into());
    }

    pub fn registered(&self) -> &[PathBuf] {
        &self.registered
    }

    /// Delete registered files, returning how many were removed. Failures
    /// are never propagated. A no-op when cleanup is disabled.
    pub fn purge(&mut self) -> usize {
        if !self.enabled {
            debug!(retained = self.registered.len(), "Cleanup disabled");
            return 0;
        }
        let mut removed = 0;
        for path in self.registered.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => log_failure(&path, &err),
            }
        }
        removed
    }
}

fn log_failure(path: &Path, err: &std::io::Error) {
    debug!(path = %path.display(), error = %err, "Ignoring cleanup failure");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn purge_removes_registered_files_and_ignores_missing() {
        let temp = tempdir().unwrap();
        let present = temp.path().join("x.snnf");
        fs::write(&present, "t 1 0\n").unwrap();

        let mut cleanup = CleanupManager::new(true);
        cleanup.register(&present);
        cleanup.register(temp.path().join("never-created.snnf"));

        assert_eq!(cleanup.purge(), 1);
        assert!(!present.exists());
        assert!(cleanup.registered().is_empty());
    }

    #[test]
    fn disabled_cleanup_keeps_files() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("x.snnf");
        fs::write(&path, "t 1 0\n").unwrap();

        let mut cleanup = CleanupManager::new(false);
        cleanup.register(&path);
        assert_eq!(cleanup.purge(), 0);
        assert!(path.exists());
        assert_eq!(cleanup.registered(), [path]);
    }
}
