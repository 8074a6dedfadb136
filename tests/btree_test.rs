mod common;

use latchkv::engine::Engine;
use latchkv::error::BTreeError;
use latchkv::heap::RecordPointer;

fn ptr(k: u64) -> RecordPointer {
    RecordPointer::new(0, k as u16)
}

// spec.md §8 end-to-end scenario 2: small sequence, m = 3.
#[test]
fn small_sequence_with_order_three() {
    common::setup();
    let engine = Engine::open_with(common::tmp_dir("btree-small-m3"), 1024, 256, 3).unwrap();

    for &k in &[10u64, 29, 40, 25, 0, 5, 60, 2, 15, 16, 1] {
        engine.btree_insert(k, ptr(k)).unwrap();
    }

    let seq: Vec<u64> = engine
        .btree_range()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(seq, vec![0, 1, 2, 5, 10, 15, 16, 25, 29, 40, 60]);
}

#[test]
fn duplicate_key_is_rejected() {
    common::setup();
    let engine = Engine::open_with(common::tmp_dir("btree-dup"), 1024, 256, 4).unwrap();
    engine.btree_insert(1, ptr(1)).unwrap();
    let err = engine.btree_insert(1, ptr(2)).unwrap_err();
    assert!(matches!(err, BTreeError::DuplicateKey(1)));
}

#[test]
fn missing_key_delete_and_update_fail() {
    common::setup();
    let engine = Engine::open_with(common::tmp_dir("btree-missing"), 1024, 256, 4).unwrap();
    assert!(matches!(engine.btree_delete(7).unwrap_err(), BTreeError::NoSuchKey(7)));
    assert!(matches!(
        engine.btree_update(7, ptr(7)).unwrap_err(),
        BTreeError::NoSuchKey(7)
    ));
}

// Alternating insert/delete against a small order forces every rebalancing
// path: borrow-left, borrow-right, merge-left, merge-right.
#[test]
fn alternating_insert_delete_preserves_sorted_order() {
    common::setup();
    let engine = Engine::open_with(common::tmp_dir("btree-alternating"), 1024, 256, 3).unwrap();

    let keys: Vec<u64> = (0..64).collect();
    for &k in &keys {
        engine.btree_insert(k, ptr(k)).unwrap();
    }
    for &k in keys.iter().filter(|k| *k % 3 == 0) {
        engine.btree_delete(k).unwrap();
    }
    for &k in keys.iter().filter(|k| *k % 5 == 0) {
        if engine.btree_find(k).unwrap().is_some() {
            engine.btree_delete(k).unwrap();
        }
    }

    let mut expected: Vec<u64> = keys
        .into_iter()
        .filter(|k| k % 3 != 0 && k % 5 != 0)
        .collect();
    expected.sort_unstable();

    let seq: Vec<u64> = engine
        .btree_range()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(seq, expected);
}

// Indexing a heap record by its B+tree key and reading it back through both
// layers, as described in §2's data flow.
#[test]
fn indexed_heap_record_round_trips() {
    common::setup();
    let engine = Engine::open(common::tmp_dir("btree-heap-combo")).unwrap();

    engine.insert_indexed_record(7, b"payload-seven").unwrap();
    engine.insert_indexed_record(3, b"payload-three").unwrap();

    assert_eq!(
        engine.read_indexed_record(7).unwrap(),
        Some(b"payload-seven".to_vec())
    );
    assert_eq!(
        engine.read_indexed_record(3).unwrap(),
        Some(b"payload-three".to_vec())
    );
    assert_eq!(engine.read_indexed_record(99).unwrap(), None);
}
