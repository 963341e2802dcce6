//! Per-fragment in-process locks.
//!
//! Serializes chunk writes, deletes and the transactional merge phases on
//! one fragment while leaving other fragments untouched. Entries are
//! dropped once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

/// Table of per-fragment async mutexes.
#[derive(Clone, Default)]
pub struct FragmentLocks {
    table: LockTable,
}

/// Held lock on one fragment. Released on drop.
pub struct FragmentGuard {
    fragment_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl FragmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `fragment_id`.
    pub async fn lock(&self, fragment_id: i64) -> FragmentGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(fragment_id).or_default().clone()
        };
        let guard = mutex.lock_owned().await;

        FragmentGuard {
            fragment_id,
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Number of fragments with a live entry.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for FragmentGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table's own reference left: no holder, no waiter.
        if table
            .get(&self.fragment_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            table.remove(&self.fragment_id);
        }
    }
}
