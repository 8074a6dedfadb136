//! Per-key reentrant reader/writer locks, held for the duration of a
//! transaction (strict two-phase locking). Grounded in the reference
//! broker's `RWLock`/`LockManager`: a read is granted if there are no
//! writers, or the sole writer is the requesting transaction; a write is
//! granted if the lock is free, or the requesting transaction is already
//! the sole reader or sole writer.
//!
//! Blocking acquisition is interleaved with deadlock detection: a thread
//! about to block registers a wait-for edge, then polls
//! `WaitForGraph::find_cycle_containing` on a short timeout instead of
//! waiting forever. If the calling transaction turns out to be the
//! youngest member of a cycle it is in, it aborts itself instead of
//! waiting — the other member(s) of the cycle make progress once this
//! transaction's locks are released.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::debug;

use crate::error::TxnError;

use super::record::DbKey;
use super::transaction::TxnId;
use super::wait_for_graph::WaitForGraph;

const DEADLOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Default)]
struct LockState {
    readers: HashMap<TxnId, u32>,
    writers: HashMap<TxnId, u32>,
}

impl LockState {
    fn read_allowed(&self, txn: TxnId) -> bool {
        (self.writers.len() == 1 && self.writers.contains_key(&txn)) || self.writers.is_empty()
    }

    fn write_allowed(&self, txn: TxnId) -> bool {
        (self.readers.len() == 1 && self.readers.contains_key(&txn))
            || (self.writers.len() == 1 && self.writers.contains_key(&txn))
            || (self.readers.is_empty() && self.writers.is_empty())
    }

    fn current_blockers(&self, txn: TxnId, for_write: bool) -> Vec<TxnId> {
        let mut blockers: Vec<TxnId> = self.writers.keys().copied().filter(|&t| t != txn).collect();
        if for_write {
            blockers.extend(self.readers.keys().copied().filter(|&t| t != txn));
        }
        blockers
    }
}

struct KeyLock {
    state: Mutex<LockState>,
    condvar: Condvar,
}

impl KeyLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            condvar: Condvar::new(),
        }
    }
}

pub struct LockTable {
    locks: Mutex<HashMap<DbKey, std::sync::Arc<KeyLock>>>,
    wait_for: Mutex<WaitForGraph>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait_for: Mutex::new(WaitForGraph::new()),
        }
    }

    fn key_lock(&self, key: &DbKey) -> std::sync::Arc<KeyLock> {
        self.locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| std::sync::Arc::new(KeyLock::new()))
            .clone()
    }

    pub fn acquire_read(&self, txn: TxnId, key: &DbKey) -> Result<(), TxnError> {
        let lock = self.key_lock(key);
        let mut state = lock.state.lock().unwrap();
        while !state.read_allowed(txn) {
            self.wait_or_abort(txn, &state.current_blockers(txn, false))?;
            let (s, _) = lock.condvar.wait_timeout(state, DEADLOCK_POLL_INTERVAL).unwrap();
            state = s;
        }
        self.clear_waits(txn);
        *state.readers.entry(txn).or_insert(0) += 1;
        Ok(())
    }

    pub fn acquire_write(&self, txn: TxnId, key: &DbKey) -> Result<(), TxnError> {
        let lock = self.key_lock(key);
        let mut state = lock.state.lock().unwrap();
        while !state.write_allowed(txn) {
            self.wait_or_abort(txn, &state.current_blockers(txn, true))?;
            let (s, _) = lock.condvar.wait_timeout(state, DEADLOCK_POLL_INTERVAL).unwrap();
            state = s;
        }
        self.clear_waits(txn);
        *state.writers.entry(txn).or_insert(0) += 1;
        Ok(())
    }

    pub fn release_read(&self, txn: TxnId, key: &DbKey) {
        let lock = self.key_lock(key);
        let mut state = lock.state.lock().unwrap();
        if let Some(count) = state.readers.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&txn);
            }
        }
        lock.condvar.notify_all();
    }

    pub fn release_write(&self, txn: TxnId, key: &DbKey) {
        let lock = self.key_lock(key);
        let mut state = lock.state.lock().unwrap();
        if let Some(count) = state.writers.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                state.writers.remove(&txn);
            }
        }
        lock.condvar.notify_all();
    }

    /// Drops every hold `txn` has on `key`, regardless of how many times it
    /// reentrantly acquired read/write — used at commit/abort, where S2PL
    /// releases a transaction's locks all at once rather than by undoing
    /// each individual `acquire_*` call.
    pub fn release_all_for_txn(&self, txn: TxnId, key: &DbKey) {
        let lock = self.key_lock(key);
        let mut state = lock.state.lock().unwrap();
        state.readers.remove(&txn);
        state.writers.remove(&txn);
        lock.condvar.notify_all();
    }

    fn wait_or_abort(&self, txn: TxnId, blockers: &[TxnId]) -> Result<(), TxnError> {
        let mut graph = self.wait_for.lock().unwrap();
        for &blocker in blockers {
            graph.add_edge(txn, blocker);
        }
        if let Some(cycle) = graph.find_cycle_containing(txn) {
            let victim = *cycle.iter().max().expect("a cycle has at least one member");
            if victim == txn {
                debug!("transaction {} aborted as deadlock victim in cycle {:?}", txn, cycle);
                graph.remove_transaction(txn);
                return Err(TxnError::DeadlockAborted(txn));
            }
        }
        Ok(())
    }

    fn clear_waits(&self, txn: TxnId) {
        self.wait_for.lock().unwrap().remove_transaction(txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_write_then_read_by_the_same_transaction_succeeds() {
        let table = LockTable::new();
        let key = DbKey::new("k");
        table.acquire_write(TxnId(1), &key).unwrap();
        table.acquire_read(TxnId(1), &key).unwrap();
    }

    #[test]
    fn concurrent_readers_from_different_transactions_do_not_block_each_other() {
        let table = LockTable::new();
        let key = DbKey::new("k");
        table.acquire_read(TxnId(1), &key).unwrap();
        table.acquire_read(TxnId(2), &key).unwrap();
    }

    #[test]
    fn a_two_way_wait_cycle_aborts_the_younger_transaction() {
        let table = std::sync::Arc::new(LockTable::new());
        let a = DbKey::new("a");
        let b = DbKey::new("b");

        table.acquire_write(TxnId(1), &a).unwrap();
        table.acquire_write(TxnId(2), &b).unwrap();

        let table2 = table.clone();
        let b2 = b.clone();
        let handle = std::thread::spawn(move || table2.acquire_write(TxnId(1), &b2));

        std::thread::sleep(Duration::from_millis(50));
        let result = table.acquire_write(TxnId(2), &a);
        assert!(matches!(result, Err(TxnError::DeadlockAborted(TxnId(2)))));

        // A real abort releases every lock the victim transaction held, not
        // just the request that detected the cycle.
        table.release_write(TxnId(2), &b);
        handle.join().unwrap().unwrap();
        table.release_write(TxnId(1), &a);
        table.release_write(TxnId(1), &b);
    }
}
