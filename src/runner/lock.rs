//! Process-wide run lock.
//!
//! A lock file created with `create_new` guarantees a single active
//! runner system-wide. The guard removes the file on drop, so release
//! happens on every exit path — normal return, early return, or panic
//! unwind — without a registered shutdown callback.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to acquire the lock. Returns `None` when another runner holds
    /// it — expected behavior under a periodic scheduler, not an error.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // The holder's PID lets an operator diagnose a stale lock
                // left behind by a crashed process.
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "Run lock acquired");
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e).context(format!("Failed to create lock file {}", path.display())),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        } else {
            debug!(path = %self.path.display(), "Run lock released");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_lock_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tally_test_lock_{}.lock", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_acquire_and_release() {
        let path = temp_lock_path();

        let lock = RunLock::try_acquire(&path).unwrap();
        assert!(lock.is_some());
        assert!(path.exists());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_contention_returns_none() {
        let path = temp_lock_path();

        let _held = RunLock::try_acquire(&path).unwrap().unwrap();
        let second = RunLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_reacquire_after_release() {
        let path = temp_lock_path();

        drop(RunLock::try_acquire(&path).unwrap());
        let again = RunLock::try_acquire(&path).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_release_on_early_return() {
        let path = temp_lock_path();

        fn bails_early(path: &Path) -> Result<()> {
            let _lock = RunLock::try_acquire(path)?;
            anyhow::bail!("something failed mid-run");
        }

        assert!(bails_early(&path).is_err());
        assert!(!path.exists(), "lock must be released on the error path");
    }

    #[test]
    fn test_lock_file_records_pid() {
        let path = temp_lock_path();
        let _lock = RunLock::try_acquire(&path).unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.trim().parse::<u32>().unwrap(),
            std::process::id(),
        );
    }
}
