use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use super::block::Block;
use crate::error::HeapError;

/// Size, in bytes, of the reserved header region preceding the first block.
pub const HEADER_SIZE: usize = 1024;

/// (block number, slot index) — stable for the life of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPointer {
    pub block: u16,
    pub slot: u16,
}

impl RecordPointer {
    pub fn new(block: u16, slot: u16) -> Self {
        Self { block, slot }
    }
}

/// A slotted-page heap file: a fixed-size reserved header followed by
/// contiguous fixed-size blocks. New records are appended to the tail
/// (highest-numbered) block, spilling into a freshly appended block when
/// the tail is full. Records are never moved or edited in place.
pub struct HeapFile {
    block_size: usize,
    file: Mutex<File>,
}

impl HeapFile {
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            block_size,
            file: Mutex::new(file),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(file: &mut File, block_size: usize) -> std::io::Result<u16> {
        let end = file.seek(SeekFrom::End(0))?;
        if (end as usize) < HEADER_SIZE {
            return Ok(0);
        }
        Ok(((end as usize - HEADER_SIZE) / block_size) as u16)
    }

    fn read_block_at(
        file: &mut File,
        block_size: usize,
        block_number: u16,
    ) -> std::io::Result<Block> {
        let offset = HEADER_SIZE + block_number as usize * block_size;
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = vec![0u8; block_size];
        file.read_exact(&mut buf)?;
        Ok(Block::from_bytes(block_number, buf))
    }

    /// Write `block` to its slot, prepending the zeroed header region when
    /// this is the very first block written to the file.
    fn write_block(&self, file: &mut File, block: &Block) -> std::io::Result<()> {
        let offset = HEADER_SIZE + block.block_number as usize * self.block_size;
        if block.block_number == 0 && Self::block_count(file, self.block_size)? == 0 {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&vec![0u8; HEADER_SIZE])?;
        }
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(block.as_bytes())?;
        Ok(())
    }

    /// Append `payload` as a new record, allocating a fresh tail block if
    /// the current one has no room. Rejects payloads that could not fit in
    /// any single empty block.
    pub fn append_record(&self, payload: &[u8]) -> Result<RecordPointer, HeapError> {
        let max = Block::max_payload_size(self.block_size);
        if payload.len() > max {
            return Err(HeapError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut file = self.file.lock().unwrap();
        let block_count = Self::block_count(&mut file, self.block_size)?;

        let mut block = if block_count == 0 {
            Block::empty(0, self.block_size)
        } else {
            Self::read_block_at(&mut file, self.block_size, block_count - 1)?
        };

        if !block.has_space_for(payload.len()) {
            block = Block::empty(block_count, self.block_size);
        }

        let slot = block.add_slot(payload);
        let pointer = RecordPointer::new(block.block_number, slot);
        self.write_block(&mut file, &block)?;
        debug!(
            "appended record of {} bytes at {:?}",
            payload.len(),
            pointer
        );
        Ok(pointer)
    }

    pub fn read_record(&self, pointer: RecordPointer) -> Result<Vec<u8>, HeapError> {
        let mut file = self.file.lock().unwrap();
        let block_count = Self::block_count(&mut file, self.block_size)?;
        if pointer.block >= block_count {
            return Err(HeapError::NoSuchBlock(pointer.block));
        }
        let block = Self::read_block_at(&mut file, self.block_size, pointer.block)?;
        Ok(block.get_slot(pointer.slot)?.to_vec())
    }
}
