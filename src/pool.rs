//! Keyed pool of exclusive index writers.
//!
//! A [`WriterPool`] holds at most one slot per partition key. A slot is either
//! idle (holding a ready [`WriterHandle`] or a not-yet-realized
//! [`WriterProxy`]) or checked out by exactly one caller. The protocol is:
//!
//! - [`WriterPool::check_in_proxy`] registers a deferred writer,
//! - [`WriterPool::check_out`] claims the slot, materializing a proxy on first use,
//! - [`WriterPool::check_in`] hands the writer back (or installs a new one),
//! - [`WriterPool::remove`] / [`WriterPool::clean`] evict and close.
//!
//! Check-out never waits. A busy key fails immediately with
//! [`QuiverError::AlreadyInUse`](crate::error::QuiverError::AlreadyInUse) and
//! the caller decides whether to retry (see
//! [`RetryPolicy`](crate::config::RetryPolicy)).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quiver::pool::{SegmentWriterProxy, WriterPool};
//! use quiver::storage::{MemoryStorage, Storage};
//! use quiver::writer::{Document, SegmentWriter, SegmentWriterConfig};
//!
//! # fn main() -> quiver::error::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
//! let pool: WriterPool<SegmentWriter> = WriterPool::new();
//!
//! pool.check_in_proxy("part-00000", SegmentWriterProxy::new(storage, SegmentWriterConfig::default()))?;
//!
//! let writer = pool.check_out("part-00000")?;
//! writer.add_document(Document::new().with_field("id", "1"))?;
//! assert!(pool.check_out("part-00000").unwrap_err().is_already_in_use());
//! pool.check_in("part-00000", writer)?;
//!
//! pool.clean()?;
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod key;
pub mod proxy;
pub mod slot;
pub mod stats;
pub mod writer_pool;

pub use handle::WriterHandle;
pub use key::PartitionKey;
pub use proxy::{SegmentWriterProxy, WriterProxy};
pub use slot::SlotKind;
pub use stats::{PoolStats, PoolStatsSnapshot};
pub use writer_pool::{PoolConfig, WriterPool};
