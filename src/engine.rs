//! Ties the three storage subsystems into one handle.
//!
//! Grounded in the teacher's `Database` (one struct owning a buffer pool and
//! a catalog, each independently synchronized) but constructed per-instance
//! rather than as a process-wide `OnceCell` singleton, so an embedding
//! application — and this crate's own tests — can run several engines side
//! by side. `Engine` owns one `HeapFile`, one `BTree`, and one `KvStore`,
//! each already guarded by its own internal mutex; `Engine` itself adds no
//! further locking.

use std::path::Path;

use crate::btree::{BTree, PageManager};
use crate::error::{BTreeError, HeapError, TxnError};
use crate::heap::{HeapFile, RecordPointer};
use crate::txn::{DbKey, DbRecord, KvStore, TxnId};

/// Default block size for the heap file, matching spec.md's illustrative
/// `B = 1024`.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default page size for the B+tree, matching spec.md's illustrative
/// `P = 4096`.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default B+tree order. spec.md's worked examples use both 3 and 5.
pub const DEFAULT_ORDER: u8 = 5;

pub struct Engine {
    heap: HeapFile,
    tree: BTree,
    kv: KvStore,
}

impl Engine {
    /// Opens (creating if absent) the three backing files under `dir`:
    /// `heap.db`, `btree.db`, `kv.log`.
    pub fn open<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        Self::open_with(
            dir,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_PAGE_SIZE,
            DEFAULT_ORDER,
        )
    }

    pub fn open_with<P: AsRef<Path>>(
        dir: P,
        block_size: usize,
        page_size: usize,
        order: u8,
    ) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let heap = HeapFile::open(dir.join("heap.db"), block_size)?;
        let pages = PageManager::open(dir.join("btree.db"), page_size)?;
        let tree = BTree::new(pages, order);
        let kv = KvStore::open(dir.join("kv.log")).map_err(|e| match e {
            TxnError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        })?;
        Ok(Self { heap, tree, kv })
    }

    // ---- heap ------------------------------------------------------------

    pub fn append_record(&self, payload: &[u8]) -> Result<RecordPointer, HeapError> {
        self.heap.append_record(payload)
    }

    pub fn read_record(&self, pointer: RecordPointer) -> Result<Vec<u8>, HeapError> {
        self.heap.read_record(pointer)
    }

    // ---- b+tree ------------------------------------------------------------

    pub fn btree_insert(&self, key: u64, value: RecordPointer) -> Result<(), BTreeError> {
        self.tree.insert(key, value)
    }

    pub fn btree_delete(&self, key: u64) -> Result<(), BTreeError> {
        self.tree.delete(key)
    }

    pub fn btree_find(&self, key: u64) -> Result<Option<RecordPointer>, BTreeError> {
        self.tree.find(key)
    }

    pub fn btree_update(&self, key: u64, value: RecordPointer) -> Result<(), BTreeError> {
        self.tree.update(key, value)
    }

    pub fn btree_range(&self) -> Result<Vec<(u64, RecordPointer)>, BTreeError> {
        self.tree.range()
    }

    /// Indexes a heap-resident record's pointer under `key`, matching §2's
    /// "B+tree stores (block, slot) pointers as values" data flow.
    pub fn insert_indexed_record(&self, key: u64, payload: &[u8]) -> Result<RecordPointer, EngineError> {
        let pointer = self.heap.append_record(payload)?;
        self.tree.insert(key, pointer)?;
        Ok(pointer)
    }

    pub fn read_indexed_record(&self, key: u64) -> Result<Option<Vec<u8>>, EngineError> {
        match self.tree.find(key)? {
            Some(pointer) => Ok(Some(self.heap.read_record(pointer)?)),
            None => Ok(None),
        }
    }

    // ---- transactional kv ------------------------------------------------

    pub fn begin(&self) -> TxnId {
        self.kv.begin()
    }

    pub fn txn_read(&self, tx: TxnId, key: &DbKey) -> Result<String, TxnError> {
        self.kv.txn_read(tx, key).map(|r| r.value)
    }

    pub fn txn_insert(&self, tx: TxnId, key: DbKey, value: String) -> Result<(), TxnError> {
        self.kv.txn_insert(tx, DbRecord::new(key, value))
    }

    pub fn txn_update(&self, tx: TxnId, key: DbKey, value: String) -> Result<(), TxnError> {
        self.kv.txn_update(tx, DbRecord::new(key, value))
    }

    pub fn txn_delete(&self, tx: TxnId, key: &DbKey) -> Result<(), TxnError> {
        self.kv.txn_delete(tx, key)
    }

    pub fn txn_commit(&self, tx: TxnId) -> Result<(), TxnError> {
        self.kv.txn_commit(tx)
    }

    pub fn txn_abort(&self, tx: TxnId) -> Result<(), TxnError> {
        self.kv.txn_abort(tx)
    }

    pub fn insert(&self, key: DbKey, value: String) -> Result<(), TxnError> {
        self.kv.insert(DbRecord::new(key, value))
    }

    pub fn update(&self, key: DbKey, value: String) -> Result<(), TxnError> {
        self.kv.update(DbRecord::new(key, value))
    }

    pub fn delete(&self, key: &DbKey) -> Result<(), TxnError> {
        self.kv.delete(key)
    }

    pub fn read(&self, key: &DbKey) -> Result<String, TxnError> {
        self.kv.read(key).map(|r| r.value)
    }
}

/// Error produced by the combined heap+B+tree helpers, which can fail on
/// either side of the pairing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    BTree(#[from] BTreeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("latchkv-engine-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&p);
        p
    }

    #[test]
    fn heap_round_trip_through_the_engine() {
        let engine = Engine::open(tmp_dir("heap")).unwrap();
        let p1 = engine.append_record(b"Hello").unwrap();
        let p2 = engine.append_record(b"World").unwrap();
        assert_eq!(engine.read_record(p1).unwrap(), b"Hello");
        assert_eq!(engine.read_record(p2).unwrap(), b"World");
    }

    #[test]
    fn btree_small_sequence_matches_spec_example() {
        let engine = Engine::open_with(tmp_dir("btree-small"), 1024, 256, 3).unwrap();
        for k in [10u64, 29, 40, 25, 0, 5, 60, 2, 15, 16, 1] {
            engine.btree_insert(k, RecordPointer::new(0, k as u16)).unwrap();
        }
        let seq: Vec<u64> = engine.btree_range().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(seq, vec![0, 1, 2, 5, 10, 15, 16, 25, 29, 40, 60]);
    }

    #[test]
    fn indexed_record_round_trips_key_to_heap_payload() {
        let engine = Engine::open(tmp_dir("indexed")).unwrap();
        engine.insert_indexed_record(42, b"payload").unwrap();
        assert_eq!(
            engine.read_indexed_record(42).unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(engine.read_indexed_record(43).unwrap(), None);
    }

    #[test]
    fn transaction_visibility_matches_spec_scenario_4() {
        let engine = Engine::open(tmp_dir("txn-visibility")).unwrap();
        let key = DbKey::new("key");

        let tx = engine.begin();
        engine.txn_insert(tx, key.clone(), "value".to_string()).unwrap();
        assert!(matches!(engine.read(&key), Err(TxnError::RecordDoesNotExist(_))));
        engine.txn_commit(tx).unwrap();
        assert_eq!(engine.read(&key).unwrap(), "value");
    }
}
