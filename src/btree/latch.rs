//! Per-page latches used for crabbing (lock coupling) during tree descent.
//!
//! These are short-lived structural latches, entirely separate from the
//! long-held per-key transaction locks in `txn::lock` — a thread can hold a
//! page latch for microseconds while it decides whether a split/merge is
//! needed, then drop it, while a transaction's row lock lives for the whole
//! transaction. Grounded in the `Latches` stack from the teacher's crabbing
//! insert path, generalized here to also support the delete side (borrow and
//! merge) and a try-lock escape hatch for sibling pointer maintenance.

use std::collections::HashMap;
use std::mem::transmute;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use super::page_id::PageId;

#[derive(Default)]
pub struct LatchManager {
    table: Mutex<HashMap<PageId, Arc<RwLock<()>>>>,
}

impl LatchManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, page_id: PageId) -> Arc<RwLock<()>> {
        self.table
            .lock()
            .unwrap()
            .entry(page_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub fn read(&self, page_id: PageId) -> OwnedReadLatch {
        let lock = self.entry(page_id);
        let guard = lock.read().unwrap_or_else(|p| p.into_inner());
        // Extends the guard's borrow to 'static: sound because `lock` is an
        // Arc kept alive for exactly as long as `guard`, and the RwLock's
        // backing allocation never moves once the Arc exists.
        let guard = unsafe {
            transmute::<RwLockReadGuard<'_, ()>, RwLockReadGuard<'static, ()>>(guard)
        };
        OwnedReadLatch {
            guard: Some(guard),
            lock,
        }
    }

    pub fn write(&self, page_id: PageId) -> OwnedWriteLatch {
        let lock = self.entry(page_id);
        let guard = lock.write().unwrap_or_else(|p| p.into_inner());
        let guard = unsafe {
            transmute::<RwLockWriteGuard<'_, ()>, RwLockWriteGuard<'static, ()>>(guard)
        };
        OwnedWriteLatch {
            guard: Some(guard),
            lock,
        }
    }

    /// Non-blocking write latch, used when touching a sibling out of
    /// root-to-leaf order (updating the left sibling's `next` pointer after
    /// a split). Callers must be prepared to abandon the whole operation and
    /// restart from the root when this returns `None`, since it never waits.
    pub fn try_write(&self, page_id: PageId) -> Option<OwnedWriteLatch> {
        let lock = self.entry(page_id);
        let guard = match lock.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        let guard = unsafe {
            transmute::<RwLockWriteGuard<'_, ()>, RwLockWriteGuard<'static, ()>>(guard)
        };
        Some(OwnedWriteLatch {
            guard: Some(guard),
            lock,
        })
    }
}

/// A write latch on one page, held for as long as this value is alive so it
/// can live inside a `LatchStack` without borrowing the manager. Field order
/// matters: `guard` must drop before `lock`.
pub struct OwnedWriteLatch {
    guard: Option<RwLockWriteGuard<'static, ()>>,
    lock: Arc<RwLock<()>>,
}

pub struct OwnedReadLatch {
    guard: Option<RwLockReadGuard<'static, ()>>,
    lock: Arc<RwLock<()>>,
}

impl Drop for OwnedWriteLatch {
    fn drop(&mut self) {
        self.guard.take();
    }
}

impl Drop for OwnedReadLatch {
    fn drop(&mut self) {
        self.guard.take();
    }
}

/// The stack of write latches currently held from the root down to the
/// node being examined, in acquisition order. Dropping a prefix of the
/// stack (everything but the last entry) implements the "release ancestors
/// once this node is proven safe" step of crabbing.
pub struct LatchStack {
    held: Vec<OwnedWriteLatch>,
}

impl LatchStack {
    pub fn new() -> Self {
        Self { held: vec![] }
    }

    pub fn push(&mut self, latch: OwnedWriteLatch) {
        self.held.push(latch);
    }

    /// Drop every latch except the one just pushed, keeping only the latch
    /// on the node currently being visited.
    pub fn release_ancestors(&mut self) {
        if self.held.len() > 1 {
            let last = self.held.pop().unwrap();
            self.held.clear();
            self.held.push(last);
        }
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }
}
