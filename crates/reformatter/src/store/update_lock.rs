//! Exclusive claim on a store for the duration of an update.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;

/// Name of the lock file in the store root.
pub const UPDATE_LOCK_FILE: &str = "update.lock";

/// Held while an update writes to a store. Released when dropped.
///
/// The claim is a file created with `create_new`, so two processes updating
/// the same store cannot both hold it. A process killed mid-update leaves
/// the file behind; it must be removed by hand once no update is running.
#[derive(Debug)]
pub struct UpdateLock {
    path: Option<PathBuf>,
}

impl UpdateLock {
    /// A claim that guards nothing, for stores with a single writer.
    pub fn unguarded() -> Self {
        Self { path: None }
    }

    /// Claim `path`, failing with [`StoreError::Locked`] if it already exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::Locked(path.display().to_string()),
                _ => StoreError::from(e),
            })?;

        debug!(path = %path.display(), "Acquired update lock");
        let lock = Self { path: Some(path) };
        writeln!(file, "{}", std::process::id())?;
        Ok(lock)
    }

    /// Lock file, unless unguarded.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to release update lock");
            }
        }
    }
}
