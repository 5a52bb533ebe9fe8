//! In-memory storage for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::traits::{
    Storage, StorageError, StorageInput, StorageLock, StorageOutput, validate_name,
};

type Files = Arc<Mutex<HashMap<String, Arc<[u8]>>>>;
type Locks = Arc<Mutex<HashSet<String>>>;

/// Storage whose files and locks live in process memory.
///
/// Clones share the same files and locks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Files,
    locks: Locks,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Sum of all file sizes in bytes.
    pub fn total_size(&self) -> u64 {
        self.files.lock().values().map(|data| data.len() as u64).sum()
    }

    fn missing(name: &str) -> StorageError {
        StorageError::Missing(name.to_string())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let data = self.files.lock().get(name).cloned();
        let data = data.ok_or_else(|| Self::missing(name))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        validate_name(name)?;
        Ok(Box::new(PendingFile {
            name: name.to_string(),
            bytes: Some(Vec::new()),
            files: Arc::clone(&self.files),
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files.get(name).ok_or_else(|| Self::missing(name))?;
        Ok(data.len() as u64)
    }

    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        validate_name(name)?;
        if !self.locks.lock().insert(name.to_string()) {
            return Err(StorageError::Locked(name.to_string()).into());
        }
        Ok(Box::new(HeldLock {
            name: Some(name.to_string()),
            locks: Arc::clone(&self.locks),
        }))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.locks.lock().contains(name)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// File contents being written; published into the map on close.
#[derive(Debug)]
struct PendingFile {
    name: String,
    bytes: Option<Vec<u8>>,
    files: Files,
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.bytes.as_mut() {
            Some(bytes) => {
                bytes.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::other(format!("{} is closed", self.name))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for PendingFile {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(bytes) = self.bytes.take() {
            self.files.lock().insert(self.name.clone(), bytes.into());
        }
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[derive(Debug)]
struct HeldLock {
    name: Option<String>,
    locks: Locks,
}

impl StorageLock for HeldLock {
    fn release(&mut self) -> Result<()> {
        if let Some(name) = self.name.take() {
            self.locks.lock().remove(&name);
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.name.is_some()
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
