//! Fixed-size page storage for the B+tree, backed by a single file.
//!
//! Page 0 is always the root; `allocate` hands out the next page number by
//! file length, mirroring how `HeapFile` derives its block count from the
//! file size instead of keeping a separate free list.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use super::node::{decode, encode, Node};
use super::page_id::PageId;
use crate::error::BTreeError;

pub struct PageManager {
    page_size: usize,
    file: Mutex<File>,
}

impl PageManager {
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            page_size,
            file: Mutex::new(file),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(file: &mut File, page_size: usize) -> std::io::Result<u32> {
        let end = file.seek(SeekFrom::End(0))?;
        Ok((end as usize / page_size) as u32)
    }

    /// Reads `page_id`, treating a page beyond the current end of file as an
    /// empty leaf (the state of a freshly allocated root).
    pub fn read_or_empty(&self, page_id: PageId) -> Result<Node, BTreeError> {
        let mut file = self.file.lock().unwrap();
        let count = Self::page_count(&mut file, self.page_size)?;
        if page_id >= count {
            return Ok(Node::empty_leaf());
        }
        let offset = page_id as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)?;
        Ok(decode(&buf))
    }

    pub fn write_page(&self, page_id: PageId, node: &Node) -> Result<(), BTreeError> {
        let bytes = encode(node, self.page_size)?;
        let mut file = self.file.lock().unwrap();
        let offset = page_id as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Allocates the next unused page number without writing to it. Page 0
    /// always exists once anything has been written, so the first call
    /// after opening a fresh file returns 1 (the root itself is written
    /// directly to page 0 rather than through `allocate`).
    pub fn allocate(&self) -> Result<PageId, BTreeError> {
        let mut file = self.file.lock().unwrap();
        let count = Self::page_count(&mut file, self.page_size)?;
        let next = count.max(1);
        let offset = next as u64 * self.page_size as u64;
        file.set_len(offset + self.page_size as u64)?;
        Ok(next)
    }
}
