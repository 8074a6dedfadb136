//! Transaction identity and transaction-local state.
//!
//! A transaction buffers its writes locally (including tombstones for
//! deletes) instead of touching the shared index immediately, so that a
//! reader inside the same transaction sees its own uncommitted writes
//! while other transactions do not. Grounded in the reference broker's
//! `TxnMetadata`/`TxnOp` local-index design, generalized to also track
//! which keys were only read (needed for S2PL lock release bookkeeping).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::record::DbKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
pub struct TxnIdGenerator {
    next: AtomicU64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    pub fn generate(&self) -> TxnId {
        TxnId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A transaction-private write: an inserted/updated value, or a tombstone
/// recording that the key was deleted within this transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalWrite {
    Value(String),
    Tombstone,
}

#[derive(Default)]
pub struct Transaction {
    pub id_holder: Option<TxnId>,
    local_writes: HashMap<DbKey, LocalWrite>,
    write_order: Vec<DbKey>,
    keys_locked: Vec<DbKey>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id_holder: Some(id),
            local_writes: HashMap::new(),
            write_order: vec![],
            keys_locked: vec![],
        }
    }

    pub fn id(&self) -> TxnId {
        self.id_holder.expect("transaction always carries its id")
    }

    pub fn record_write(&mut self, key: DbKey, write: LocalWrite) {
        if !self.local_writes.contains_key(&key) {
            self.write_order.push(key.clone());
        }
        self.local_writes.insert(key, write);
    }

    pub fn local_write(&self, key: &DbKey) -> Option<&LocalWrite> {
        self.local_writes.get(key)
    }

    /// Writes in the order they were first made, for replay at commit.
    pub fn writes_in_order(&self) -> impl Iterator<Item = (&DbKey, &LocalWrite)> {
        self.write_order.iter().map(move |k| (k, &self.local_writes[k]))
    }

    pub fn note_locked(&mut self, key: DbKey) {
        if !self.keys_locked.contains(&key) {
            self.keys_locked.push(key);
        }
    }

    pub fn locked_keys(&self) -> &[DbKey] {
        &self.keys_locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_generated_in_increasing_order() {
        let gen = TxnIdGenerator::new();
        let a = gen.generate();
        let b = gen.generate();
        assert!(b.0 > a.0);
    }

    #[test]
    fn writes_replay_in_first_write_order() {
        let mut txn = Transaction::new(TxnId(1));
        txn.record_write(DbKey::new("b"), LocalWrite::Value("1".into()));
        txn.record_write(DbKey::new("a"), LocalWrite::Value("2".into()));
        txn.record_write(DbKey::new("b"), LocalWrite::Value("3".into()));
        let keys: Vec<_> = txn.writes_in_order().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![DbKey::new("b"), DbKey::new("a")]);
    }
}
