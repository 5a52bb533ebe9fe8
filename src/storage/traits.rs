//! The flat file namespace segment writers persist into.

use std::fmt::Debug;
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::error::{QuiverError, Result};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Named files plus one exclusive lock per partition.
pub trait Storage: Send + Sync + Debug {
    /// Reader over the complete contents of `name`.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Writer that replaces `name`. Readers see the new contents once the
    /// output is closed.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    /// Data file names in lexical order. Lock files are never listed.
    fn list_files(&self) -> Result<Vec<String>>;

    fn file_size(&self, name: &str) -> Result<u64>;

    /// Take the exclusive lock for partition `name`.
    ///
    /// Fails with [`StorageError::Locked`] while anyone, in this process or
    /// another one sharing the storage, holds it.
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;

    fn lock_exists(&self, name: &str) -> bool;

    /// Make closed outputs durable.
    fn sync(&self) -> Result<()>;
}

/// Anything a segment can be read back from.
pub trait StorageInput: Read + Send + Debug {}

impl<T: Read + Send + Debug> StorageInput for T {}

/// A file being written.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes, and fsync if the storage was configured to.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Finish the file. Writing after close fails.
    fn close(&mut self) -> Result<()>;
}

/// A held partition lock. Dropping it releases the lock.
pub trait StorageLock: Send + Debug {
    /// Give the lock back. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()>;

    fn is_held(&self) -> bool;
}

/// Options shared by the storage backends.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Read and write buffer capacity in bytes.
    pub buffer_size: usize,

    /// fsync every segment on `flush_and_sync`, not only on close.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync_writes: false,
        }
    }
}

/// Failures raised by the storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("no such file: {0}")]
    Missing(String),

    #[error("not a flat file name: {0:?}")]
    InvalidName(String),

    #[error("partition '{0}' is locked")]
    Locked(String),

    #[error("{name}: {message}")]
    Io { name: String, message: String },
}

impl StorageError {
    /// Classify an I/O failure on file `name`.
    pub fn from_io(name: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::Missing(name.to_string()),
            io::ErrorKind::AlreadyExists => StorageError::Locked(name.to_string()),
            _ => StorageError::Io {
                name: name.to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl From<StorageError> for QuiverError {
    fn from(err: StorageError) -> Self {
        QuiverError::storage(err.to_string())
    }
}

/// Reject names that would escape a flat namespace.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let escapes = matches!(name, "" | "." | "..") || name.contains(['/', '\\', '\0']);
    if escapes {
        return Err(StorageError::InvalidName(name.to_string()).into());
    }
    Ok(())
}
