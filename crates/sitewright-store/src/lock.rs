//! Per-client advisory locks with staleness eviction.
//!
//! One lock file per client, content = acquisition unix-epoch seconds. A lock
//! older than the staleness threshold is treated as released even if its file
//! still exists, which self-heals after crashed holders. Acquisition is
//! check-then-set, not atomic across processes; that is acceptable because
//! the lock only needs to prevent sustained double-processing.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sitewright_types::{ClientId, Result, SitewrightError};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    ttl: Duration,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn with_default_ttl(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_LOCK_TTL)
    }

    fn lock_path(&self, id: &ClientId) -> PathBuf {
        self.dir.join(format!("{}.lock", id.as_str()))
    }

    fn now_epoch() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Check whether a live lock exists for the client.
    ///
    /// A stale lock (older than the ttl) or an unreadable/empty lock file is
    /// reported unlocked and removed on the spot.
    pub fn is_locked(&self, id: &ClientId) -> bool {
        let path = self.lock_path(id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return false,
        };

        let timestamp: u64 = match raw.trim().parse() {
            Ok(ts) => ts,
            Err(_) => {
                tracing::warn!(client = %id, "Unreadable lock file, treating as unlocked");
                let _ = fs::remove_file(&path);
                return false;
            }
        };

        let age = Self::now_epoch().saturating_sub(timestamp);
        if age > self.ttl.as_secs() {
            tracing::warn!(client = %id, age_secs = age, "Stale lock detected, removing");
            let _ = fs::remove_file(&path);
            return false;
        }
        true
    }

    /// Attempt to acquire the lock. Returns `false` if already held.
    pub fn try_acquire(&self, id: &ClientId) -> bool {
        if self.is_locked(id) {
            return false;
        }
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::error!(client = %id, error = %e, "Failed to create lock directory");
            return false;
        }
        match fs::write(self.lock_path(id), Self::now_epoch().to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(client = %id, error = %e, "Failed to write lock file");
                false
            }
        }
    }

    pub fn release(&self, id: &ClientId) {
        let path = self.lock_path(id);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(client = %id, error = %e, "Failed to remove lock file");
            }
        }
    }

    /// Acquire the lock as a scoped guard; releasing cannot be forgotten on
    /// any exit path, the guard's drop handles it.
    pub fn acquire(&self, id: &ClientId) -> Result<LockGuard<'_>> {
        if !self.try_acquire(id) {
            return Err(SitewrightError::LockContention {
                client: id.to_string(),
            });
        }
        Ok(LockGuard {
            manager: self,
            id: id.clone(),
        })
    }

    /// Test hook: backdate a lock file so staleness paths can be exercised.
    #[doc(hidden)]
    pub fn write_raw_lock(&self, id: &ClientId, epoch_secs: u64) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.lock_path(id), epoch_secs.to_string())?;
        Ok(())
    }
}

/// RAII guard for a held client lock.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    id: ClientId,
}

impl LockGuard<'_> {
    pub fn client(&self) -> &ClientId {
        &self.id
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
