//! Shared handle to a concrete writer.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;
use crate::writer::{Document, IndexWriter};

/// A concrete, already-open writer as the pool hands it out.
///
/// Cloning a handle clones the reference, not the writer. The pool keeps one
/// clone in the slot so it can still close a checked-out writer on
/// `remove`/`clean`; the caller holds the other. Two handles are equal when
/// they refer to the same writer.
pub struct WriterHandle<W> {
    inner: Arc<Mutex<W>>,
}

impl<W: IndexWriter> WriterHandle<W> {
    /// Wrap an open writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Lock the writer for direct use.
    pub fn lock(&self) -> MutexGuard<'_, W> {
        self.inner.lock()
    }

    /// Whether both handles refer to the same writer.
    pub fn same_writer(&self, other: &WriterHandle<W>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn add_document(&self, doc: Document) -> Result<()> {
        self.inner.lock().add_document(doc)
    }

    /// Flush pending documents.
    pub fn commit(&self) -> Result<()> {
        self.inner.lock().commit()
    }

    pub fn pending_docs(&self) -> u64 {
        self.inner.lock().pending_docs()
    }

    /// Close the writer. Blocks while another thread holds the writer lock.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }
}

impl<W: IndexWriter> From<W> for WriterHandle<W> {
    fn from(writer: W) -> Self {
        Self::new(writer)
    }
}

impl<W> Clone for WriterHandle<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> PartialEq for WriterHandle<W> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<W> Eq for WriterHandle<W> {}

impl<W> fmt::Debug for WriterHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterHandle")
            .field("writer", &Arc::as_ptr(&self.inner))
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}
