//! Inter-process exclusion for a roster file.
//!
//! The lock lives on a sidecar `<roster>.lock` file rather than the roster
//! itself because saves replace the roster by rename.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};

/// An exclusive advisory lock held for as long as the value lives.
#[derive(Debug)]
pub struct RosterLock {
    path: PathBuf,
    file: File,
}

impl RosterLock {
    /// Take the lock for the roster at `roster_path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RosterLocked`] if another holder exists, or
    /// [`Error::Io`] if the lock file cannot be created.
    pub fn acquire(roster_path: impl AsRef<Path>) -> Result<Self> {
        let path = lock_path(roster_path.as_ref());
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        FileExt::try_lock_exclusive(&file).map_err(|source| Error::RosterLocked {
            path: path.clone(),
            source,
        })?;

        debug!("Acquired roster lock {}", path.display());
        Ok(Self { path, file })
    }

    /// Path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RosterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released roster lock {}", self.path.display());
    }
}

/// Sidecar lock file path for a roster.
#[must_use]
pub fn lock_path(roster_path: &Path) -> PathBuf {
    let mut name = roster_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
