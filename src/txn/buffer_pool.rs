//! Append-only durability log for the transactional layer, independent of
//! the heap file: every committed write gets one length-prefixed record
//! appended here, and `load_all` rebuilds the primary index by replaying
//! the whole log on startup. Grounded in the reference broker's
//! `BufferPool`/`Database.load_all`.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufReader, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use super::record::{DbKey, DbRecord};

pub struct BufferPool {
    file: Mutex<File>,
}

impl BufferPool {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Appends `record`'s encoding to the end of the log.
    pub fn append(&self, record: &DbRecord) -> std::io::Result<()> {
        let mut file = self.file.lock().unwrap();
        record.write_to(&mut *file)?;
        debug!("appended log record for key {}", record.key);
        Ok(())
    }

    /// Replays the whole log, returning the last record seen for each key
    /// (later records shadow earlier ones, matching the in-place `update`
    /// semantics of the log's read path).
    pub fn load_all(&self) -> std::io::Result<HashMap<DbKey, DbRecord>> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *file);
        let mut index = HashMap::new();
        while let Some(record) = DbRecord::read_from(&mut reader)? {
            index.insert(record.key.clone(), record);
        }
        Ok(index)
    }
}
