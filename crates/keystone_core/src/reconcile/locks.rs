//! In-process serialization of reconciliations per path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per descriptor path.
///
/// Reconciliations of the same path queue up; different paths proceed
/// concurrently. Entries are dropped once nobody holds or waits for them.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one reconciliation.
#[derive(Debug)]
pub struct PathGuard<'a> {
    owner: &'a PathLocks,
    path: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str) -> PathGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        PathGuard {
            owner: self,
            path: path.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of paths currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map holds the mutex: nobody waits for it
        if let Some(mutex) = locks.get(&self.path)
            && Arc::strong_count(mutex) == 1
        {
            locks.remove(&self.path);
        }
    }
}
