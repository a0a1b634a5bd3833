//! Per-path advisory locks held for the duration of a commit.
//!
//! A second request for a held path blocks until the holder releases it or,
//! when the caller supplied a timeout, fails with
//! [`WorkspaceError::Busy`] without touching the file.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::error::WorkspaceError;

const LOCKS_TARGET: &str = "digitxmld::locks";

/// Set of currently held paths.
#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<HashSet<Utf8PathBuf>>,
    released: Condvar,
}

impl PathLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `path`, waiting at most `timeout` when given.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Busy`] when the timeout elapses first.
    pub fn acquire(
        &self,
        path: &Utf8Path,
        timeout: Option<Duration>,
    ) -> Result<PathGuard<'_>, WorkspaceError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(path) {
            debug!(target: LOCKS_TARGET, %path, "waiting for path lock");
            held = match deadline {
                None => self
                    .released
                    .wait(held)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(WorkspaceError::Busy {
                            path: path.to_path_buf(),
                        });
                    }
                    self.released
                        .wait_timeout(held, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        held.insert(path.to_path_buf());
        Ok(PathGuard {
            locks: self,
            path: path.to_path_buf(),
        })
    }

    /// Returns true while `path` is held.
    #[must_use]
    pub fn is_held(&self, path: &Utf8Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Releases its path when dropped.
#[derive(Debug)]
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: Utf8PathBuf,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.path);
        drop(held);
        self.locks.released.notify_all();
    }
}
