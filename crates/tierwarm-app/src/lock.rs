//! Advisory run lock preventing overlapping invocations.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Exclusive `flock` on the lock file, released when dropped.
pub struct RunLock {
    _guard: Flock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::LockHeld`] when another process holds the lock, or
    /// an IO/lock error when the file cannot be opened or locked.
    pub fn acquire(path: &Path) -> AppResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| AppError::io("lock.open", path, source))?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(guard) => {
                debug!(path = %path.display(), "run lock acquired");
                Ok(Self {
                    _guard: guard,
                    path: path.to_path_buf(),
                })
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Err(AppError::LockHeld {
                path: path.to_path_buf(),
            }),
            Err((_, source)) => Err(AppError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for RunLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish_non_exhaustive()
    }
}
