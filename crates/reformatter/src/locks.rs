//! Per-region exclusivity.
//!
//! Two region jobs covering the same time chunk must never overlap. Locks
//! are created lazily and handed out as owned guards so they can be held
//! across `.await` points and moved into blocking tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily populated table of region locks, keyed by time chunk index.
#[derive(Debug, Default, Clone)]
pub struct RegionLocks {
    inner: Arc<Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>>,
}

impl RegionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, chunk: u64) -> Arc<AsyncMutex<()>> {
        // A poisoned table is still a valid table.
        let mut table = match self.inner.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(table.entry(chunk).or_default())
    }

    /// Wait for exclusive access to `chunk`.
    pub async fn acquire(&self, chunk: u64) -> OwnedMutexGuard<()> {
        self.entry(chunk).lock_owned().await
    }

    /// Take `chunk` if nobody else holds it.
    pub fn try_acquire(&self, chunk: u64) -> Option<OwnedMutexGuard<()>> {
        self.entry(chunk).try_lock_owned().ok()
    }
}
