//! # Per-Item Locks
//!
//! Serializes mutating stock operations on the same item inside one process.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(item A) ──┐                                                    │
//! │  consume(item A) ──┼──► ItemLocks["A"] ──► one at a time               │
//! │  restock(item B) ──┴──► ItemLocks["B"] ──► runs in parallel with A     │
//! │                                                                         │
//! │  The guard is held across read-modify-write AND the ledger append,    │
//! │  until the transaction commits or rolls back.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock covers callers sharing one [`Database`](crate::Database). Writers
//! in other processes are caught by the version check instead.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while an item is being mutated.
pub type ItemGuard = OwnedMutexGuard<()>;

/// Registry of one async mutex per item id.
#[derive(Debug, Clone, Default)]
pub struct ItemLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `item_id`.
    pub async fn acquire(&self, item_id: &str) -> ItemGuard {
        // Clone the Arc out so the shard lock is released before awaiting.
        let mutex = self
            .inner
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Number of items that have ever been locked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
