//! # Action Locks
//!
//! Exclusive, non-blocking locks guarding externally visible resources (a
//! machine's on-disk state, its driver handle).
//!
//! ## Layers
//!
//! ```text
//! acquire("machine-action-web", held)
//!   │
//!   ├─ name ∈ held (this action's call path)  → Ok(None)    re-entrant
//!   ├─ name ∈ process set (another action)    → Err(Locked)
//!   └─ flock(<lock_dir>/<name>.lock, EX|NB)
//!        ├─ EWOULDBLOCK (another process)      → Err(Locked)
//!        └─ ok                                 → Ok(Some(guard))
//! ```
//!
//! Contention never blocks: callers that want to wait must retry.
//!
//! ## Re-entrancy
//!
//! [`HeldLocks`] is the set of lock names held by one logical call path. A
//! nested run shares its parent's set, so re-acquiring a lock the parent
//! holds succeeds without touching the file system. A sibling action with
//! its own set fails fast.
//!
//! ## Lock Files
//!
//! Lock files are never deleted (deleting a flock'd file races with the next
//! opener). While held they contain a JSON [`LockInfo`] record.

use crate::constants::LOCK_FILE_SUFFIX;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type NameSet = Arc<Mutex<HashSet<String>>>;

fn lock_set(set: &NameSet) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Held Locks
// =============================================================================

/// Lock names held by one logical call path.
#[derive(Debug, Clone, Default)]
pub struct HeldLocks {
    names: NameSet,
}

impl HeldLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        lock_set(&self.names).contains(name)
    }

    /// Held lock names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut held: Vec<String> = lock_set(&self.names).iter().cloned().collect();
        held.sort();
        held
    }

    fn insert(&self, name: &str) {
        lock_set(&self.names).insert(name.to_string());
    }

    fn remove(&self, name: &str) {
        lock_set(&self.names).remove(name);
    }
}

// =============================================================================
// Lock Manager
// =============================================================================

/// Holder metadata written into a held lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub name: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Creates and tracks lock files under one directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    active: NameSet,
}

impl LockManager {
    /// Creates a manager for `dir`. The directory is created on first acquire.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: NameSet::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}{LOCK_FILE_SUFFIX}"))
    }

    /// Returns true if an action in this process holds `name`.
    pub fn is_locked(&self, name: &str) -> bool {
        lock_set(&self.active).contains(name)
    }

    /// Acquires `name` for the call path owning `held`.
    ///
    /// Returns `Ok(None)` if `held` already contains the lock.
    pub fn acquire(&self, name: &str, held: &HeldLocks) -> Result<Option<LockGuard>> {
        if held.contains(name) {
            debug!(lock = name, "lock already held by this call path");
            return Ok(None);
        }

        if !lock_set(&self.active).insert(name.to_string()) {
            debug!(lock = name, "lock held by another action in this process");
            return Err(Error::Locked {
                name: name.to_string(),
            });
        }

        let path = self.lock_path(name);
        let file = match self.lock_file(name, &path) {
            Ok(file) => file,
            Err(e) => {
                lock_set(&self.active).remove(name);
                return Err(e);
            }
        };

        held.insert(name);
        info!(lock = name, path = %path.display(), "lock acquired");

        Ok(Some(LockGuard {
            name: name.to_string(),
            path,
            file: Some(file),
            active: Arc::clone(&self.active),
            held: held.clone(),
        }))
    }

    fn lock_file(&self, name: &str, path: &Path) -> Result<File> {
        let lock_failed = |e: std::io::Error| Error::LockFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(|e| Error::LockFailed {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(lock_failed)?;

        if !try_lock_exclusive(&file).map_err(lock_failed)? {
            debug!(lock = name, "lock file held by another process");
            return Err(Error::Locked {
                name: name.to_string(),
            });
        }

        let info = LockInfo {
            name: name.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        if let Err(e) = write_info(&mut file, &info) {
            warn!(lock = name, error = %e, "failed to record lock holder");
        }

        Ok(file)
    }

    /// Reads the holder record of `name`, if the lock file has one.
    pub fn read_info(&self, name: &str) -> Result<Option<LockInfo>> {
        let path = self.lock_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn write_info(file: &mut File, info: &LockInfo) -> Result<()> {
    file.set_len(0)?;
    serde_json::to_writer(&mut *file, info)?;
    file.flush()?;
    Ok(())
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file`, which outlives the call.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

// Without flock only the in-process set guards the lock.
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

// =============================================================================
// Guard
// =============================================================================

/// Releases the lock when dropped.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    path: PathBuf,
    file: Option<File>,
    active: NameSet,
    held: HeldLocks,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.set_len(0) {
                debug!(lock = %self.name, error = %e, "failed to clear lock holder record");
            }
            // Closing the descriptor releases the flock.
            drop(file);
        }
        self.held.remove(&self.name);
        lock_set(&self.active).remove(&self.name);
        info!(lock = %self.name, "lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_sanitizes_name() {
        let manager = LockManager::new("/tmp/locks");
        assert_eq!(
            manager.lock_path("machine-action-a/b"),
            PathBuf::from("/tmp/locks/machine-action-a_b.lock")
        );
    }

    #[test]
    fn test_reentrant_for_same_holder() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path());
        let held = HeldLocks::new();

        let guard = manager.acquire("global", &held).unwrap();
        assert!(guard.is_some());
        assert!(manager.acquire("global", &held).unwrap().is_none());
        assert_eq!(held.names(), vec!["global"]);

        drop(guard);
        assert!(!held.contains("global"));
        assert!(!manager.is_locked("global"));
    }

    #[test]
    fn test_other_holder_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let _guard = manager.acquire("global", &HeldLocks::new()).unwrap();
        let err = manager.acquire("global", &HeldLocks::new()).unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));
    }

    #[test]
    fn test_holder_record_written() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let guard = manager.acquire("global", &HeldLocks::new()).unwrap();
        let info = manager.read_info("global").unwrap().unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.name, "global");

        drop(guard);
        assert!(manager.read_info("global").unwrap().is_none());
    }
}
