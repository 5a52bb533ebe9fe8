//! Storage layer backing the segment writers.
//!
//! A segment writer only needs a flat namespace of files plus named,
//! exclusive locks. Two backends are provided:
//!
//! - [`FileStorage`]: files in a single directory, locks as `<name>.lock`
//!   files created with `create_new` so that two processes cannot both hold
//!   a partition.
//! - [`MemoryStorage`]: everything in memory, for tests and dry runs.
//!
//! # Example
//!
//! ```
//! use std::io::Write;
//! use quiver::storage::{MemoryStorage, Storage};
//!
//! # fn main() -> quiver::error::Result<()> {
//! let storage = MemoryStorage::new();
//! let lock = storage.acquire_lock("part-00000")?;
//! assert!(storage.acquire_lock("part-00000").is_err());
//!
//! let mut out = storage.create_output("part-00000.a1.00000.jsonl")?;
//! out.write_all(b"{}\n")?;
//! out.close()?;
//! assert_eq!(storage.list_files()?, vec!["part-00000.a1.00000.jsonl"]);
//! drop(lock);
//! assert!(!storage.lock_exists("part-00000"));
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use traits::{Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput};
