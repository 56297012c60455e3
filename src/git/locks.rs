use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    // Holders plus waiters; the slot is evicted when this reaches zero.
    users: usize,
}

type LockTable = HashMap<PathBuf, Slot>;

/// One exclusive lock per canonical repository path
///
/// Entries are created on first use and removed when the last holder or
/// waiter lets go, so the table only ever holds paths with work in flight.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    table: Arc<Mutex<LockTable>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    ///
    /// Released when the returned guard drops, including when the future
    /// holding it is cancelled.
    pub async fn acquire(&self, path: &Path) -> PathLockGuard {
        let lock = {
            let mut table = lock_table(&self.table);
            let slot = table.entry(path.to_path_buf()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before awaiting, so a cancelled wait still cleans up.
        let mut guard = PathLockGuard {
            table: Arc::clone(&self.table),
            path: path.to_path_buf(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Number of paths with a holder or waiter
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    // The table holds no invariants a panicking holder could break halfway.
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive hold on one repository path
#[derive(Debug)]
pub struct PathLockGuard {
    table: Arc<Mutex<LockTable>>,
    path: PathBuf,
    held: Option<OwnedMutexGuard<()>>,
}

impl PathLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        // Unlock before the slot can be evicted, or a newcomer could get a
        // fresh mutex while this one is still held.
        self.held.take();

        let mut table = lock_table(&self.table);
        if let Some(slot) = table.get_mut(&self.path) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                table.remove(&self.path);
            }
        }
    }
}
