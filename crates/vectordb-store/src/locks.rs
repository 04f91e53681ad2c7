//! Per-slot mutual exclusion.
//!
//! A [`SlotLocks`] table keeps one async mutex per slot id that currently
//! has a holder or a waiter. Entries are created on demand and pruned when
//! the last interested party lets go, so idle slots cost nothing.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::SlotId;

type SlotMutex = Arc<Mutex<()>>;

/// Table of per-slot locks.
#[derive(Debug, Default)]
pub struct SlotLocks {
    locks: DashMap<SlotId, SlotMutex>,
}

/// Held lock on one slot. Dropping it releases the slot and prunes the
/// table entry if nobody else is waiting.
pub struct SlotLease<'a> {
    locks: &'a DashMap<SlotId, SlotMutex>,
    id: SlotId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Waiters are served in arrival
    /// order.
    pub async fn lock(&self, id: SlotId) -> SlotLease<'_> {
        let mut lease = SlotLease {
            locks: &self.locks,
            id,
            guard: None,
        };
        let mutex = self.locks.entry(id).or_default().clone();
        lease.guard = Some(mutex.lock_owned().await);
        lease
    }

    /// Run `fut` while holding the lock for `id`.
    pub async fn with_lock<F, T>(&self, id: SlotId, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _lease = self.lock(id).await;
        fut.await
    }

    /// Number of slots with a live table entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl SlotLease<'_> {
    pub fn id(&self) -> SlotId {
        self.id
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
