// src/lock.rs

//! Whole-program mutation lock.
//!
//! A single advisory lock at `R/.lock` serializes every operation that
//! writes to `store/`, `profiles/`, or `vir`. Fetching and hashing are
//! lock-free; import, assemble, and activate must run with the lock
//! held for their whole extent, which gives concurrent invocations a
//! linear order of mutations.
//!
//! The lock is `flock(LOCK_EX)` on an open file handle and is released
//! when the guard drops (or the process dies, which is what makes the
//! recovery sweep safe to run under the lock on the next start).

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guard holding the exclusive mutation lock.
pub struct MutationLock {
    // kept open to maintain the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl MutationLock {
    /// Acquire the lock, blocking until it is available.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        file.lock_exclusive()
            .map_err(|e| Error::Internal(format!("failed to acquire mutation lock: {e}")))?;

        debug!(path = %path.display(), "acquired mutation lock");
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking. Returns `Ok(None)`
    /// when another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "acquired mutation lock");
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Internal(format!(
                "failed to try-acquire mutation lock: {e}"
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        // the lock itself is released when the file handle closes
        debug!(path = %self.path.display(), "released mutation lock");
    }
}
