//! File-based locking so two processes never back up the same host at once

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the lock file inside the temporary directory
pub const LOCK_FILE_NAME: &str = "periodic-backup.lock";

/// Advisory lock file shared by every periodic-backup process on a host
pub struct RunLock {
    lock: RwLock<File>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Open (creating if needed) the lock file in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).context("Failed to create lock directory")?;

        let lock_path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        Ok(Self {
            lock: RwLock::new(file),
            lock_path,
        })
    }

    /// Take the lock without waiting; it is held until the guard drops.
    ///
    /// Fails if another process (or another `RunLock` on the same file) holds it.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        debug!("Attempting to acquire lock: {:?}", self.lock_path);
        let guard = self.lock.try_write().with_context(|| {
            format!(
                "Another periodic-backup process is running (lock held: {:?})",
                self.lock_path
            )
        })?;
        info!("Acquired run lock: {:?}", self.lock_path);
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
