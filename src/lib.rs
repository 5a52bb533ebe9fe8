//! # Quiver
//!
//! A keyed pool of exclusive, lazily created index writers.
//!
//! An index split into partitions wants exactly one open writer per
//! partition, reused across many short units of work. [`pool::WriterPool`]
//! keeps one slot per partition key and hands writers out under a
//! check-out/check-in protocol:
//!
//! - Writers can be registered eagerly (an open handle) or lazily (a proxy
//!   that opens the writer on first check-out).
//! - A key is held by at most one caller at a time; a second check-out fails
//!   immediately instead of blocking.
//! - Removing a key, replacing its writer or cleaning the pool closes the
//!   writers involved.
//!
//! Around the pool sit a JSON-lines [`writer::SegmentWriter`], the
//! [`storage`] it writes to, and [`output::PooledOutput`], the open/close
//! partition interface an indexing job uses.

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod pool;
pub mod storage;
pub mod writer;

pub mod prelude {
    pub use crate::config::{JobConfig, RetryPolicy};
    pub use crate::error::{QuiverError, Result};
    pub use crate::output::{PartitionOutput, PooledOutput};
    pub use crate::pool::{PartitionKey, WriterHandle, WriterPool, WriterProxy};
    pub use crate::writer::{Document, IndexWriter};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
