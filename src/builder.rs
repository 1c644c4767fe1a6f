//! Builder-style construction of a `ThreadTracker`. Grounded in the
//! teacher crate's `Deloxide` configuration struct.

use crate::executor::{Executor, ThreadExecutor};
use crate::logger::EventLogger;
use crate::tracker::ThreadTracker;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configures and builds a [`ThreadTracker`].
///
/// By default, a fresh `ThreadExecutor` is used and event logging is
/// disabled.
pub struct LockSubsystemBuilder {
    executor: Option<Arc<dyn Executor>>,
    log_path: Option<PathBuf>,
}

impl Default for LockSubsystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LockSubsystemBuilder {
    pub fn new() -> Self {
        Self {
            executor: None,
            log_path: None,
        }
    }

    /// Use a caller-supplied executor instead of the default
    /// one-thread-per-task `ThreadExecutor`.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Enable the background event logger, writing to `path`.
    pub fn with_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the tracker with the configured settings.
    ///
    /// # Errors
    /// Returns an error if the event log file could not be created.
    pub fn build(self) -> Result<Arc<ThreadTracker>> {
        let executor = self
            .executor
            .unwrap_or_else(|| ThreadExecutor::new() as Arc<dyn Executor>);
        let logger = match self.log_path {
            Some(path) => {
                Some(Arc::new(EventLogger::with_file(&path).with_context(|| {
                    format!("initializing event logger at {}", path.display())
                })?))
            }
            None => None,
        };
        Ok(ThreadTracker::new(executor, logger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_succeeds_without_logging() {
        let tracker = LockSubsystemBuilder::new().build().unwrap();
        assert_eq!(tracker.object_count(), 0);
    }

    #[test]
    fn with_log_creates_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let _tracker = LockSubsystemBuilder::new().with_log(&path).build().unwrap();
        assert!(path.exists());
    }
}
