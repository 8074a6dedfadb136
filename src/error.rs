//! Error kinds for the three storage subsystems.
//!
//! Each subsystem gets its own closed enum rather than one crate-wide
//! error type, so callers can match on exactly the kinds the design
//! promises for that subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("payload of {size} bytes exceeds the maximum of {max} bytes for a single block")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("block {0} does not exist")]
    NoSuchBlock(u16),

    #[error("slot {slot} does not exist in block {block} (slot count {count})")]
    NoSuchSlot { block: u16, slot: u16, count: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BTreeError {
    #[error("serialized node of {encoded} bytes exceeds the {page_size} byte page size")]
    PageOverflow { encoded: usize, page_size: usize },

    #[error("key {0} does not fit the 6-byte on-disk key width (must be < 2^48)")]
    KeyOutOfRange(u64),

    #[error("key {0} already exists")]
    DuplicateKey(u64),

    #[error("key {0} does not exist")]
    NoSuchKey(u64),

    /// Internal-only: a sibling try-lock failed during split/merge pointer
    /// maintenance. Always caught and turned into a from-the-root retry;
    /// never observed by a caller.
    #[error("sibling latch unavailable, retry from root")]
    SiblingLockUnavailable,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("record {0:?} does not exist")]
    RecordDoesNotExist(crate::txn::record::DbKey),

    #[error("record {0:?} already exists")]
    RecordAlreadyExists(crate::txn::record::DbKey),

    #[error("transaction {0} is unknown or already ended")]
    InvalidTransaction(crate::txn::transaction::TxnId),

    #[error("transaction {0} aborted as a deadlock victim")]
    DeadlockAborted(crate::txn::transaction::TxnId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
