//! Index writer trait and the JSON-lines segment writer.
//!
//! [`IndexWriter`] is the capability the pool manages: something that buffers
//! documents, can be told to commit them, and must be closed to release the
//! resources (file handles, the partition lock) it holds. The pool only ever
//! calls [`IndexWriter::close`]; committing is the caller's business.

pub mod document;
pub mod segment;

pub use document::Document;
pub use segment::{SegmentWriter, SegmentWriterConfig, WriterStats};

use crate::error::Result;

/// Trait for index writers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use quiver::storage::{MemoryStorage, Storage};
/// use quiver::writer::{Document, IndexWriter, SegmentWriter, SegmentWriterConfig};
///
/// # fn main() -> quiver::error::Result<()> {
/// let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
/// let mut writer = SegmentWriter::open(storage, "part-00000", SegmentWriterConfig::default())?;
///
/// writer.add_document(Document::new().with_field("id", "1"))?;
/// writer.commit()?;
/// writer.close()?;
/// assert!(writer.is_closed());
/// # Ok(())
/// # }
/// ```
pub trait IndexWriter: Send + std::fmt::Debug {
    /// Add a document to the index.
    fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Commit all pending documents to storage.
    fn commit(&mut self) -> Result<()>;

    /// Get the number of documents added since the last commit.
    fn pending_docs(&self) -> u64;

    /// Close the writer and release resources. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Check if the writer is closed.
    fn is_closed(&self) -> bool;
}

impl<W: IndexWriter + ?Sized> IndexWriter for Box<W> {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.as_mut().add_document(doc)
    }

    fn commit(&mut self) -> Result<()> {
        self.as_mut().commit()
    }

    fn pending_docs(&self) -> u64 {
        self.as_ref().pending_docs()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }

    fn is_closed(&self) -> bool {
        self.as_ref().is_closed()
    }
}
