//! Deferred writer creation.

use std::sync::Arc;

use crate::error::Result;
use crate::pool::key::PartitionKey;
use crate::storage::Storage;
use crate::writer::{SegmentWriter, SegmentWriterConfig};

/// A stand-in for a writer that has not been opened yet.
///
/// The pool calls [`WriterProxy::materialize`] at most once per registration,
/// on the first check-out of the slot, and keeps the resulting writer for
/// every later check-out.
///
/// Any `FnOnce(&PartitionKey) -> Result<W> + Send` closure is a proxy.
pub trait WriterProxy<W>: Send {
    /// Open the real writer for `key`.
    fn materialize(self: Box<Self>, key: &PartitionKey) -> Result<W>;
}

impl<W, F> WriterProxy<W> for F
where
    F: FnOnce(&PartitionKey) -> Result<W> + Send,
{
    fn materialize(self: Box<Self>, key: &PartitionKey) -> Result<W> {
        (*self)(key)
    }
}

/// Proxy that opens a [`SegmentWriter`] for the slot's key on a shared storage.
#[derive(Debug, Clone)]
pub struct SegmentWriterProxy {
    storage: Arc<dyn Storage>,
    config: SegmentWriterConfig,
}

impl SegmentWriterProxy {
    pub fn new(storage: Arc<dyn Storage>, config: SegmentWriterConfig) -> Self {
        Self { storage, config }
    }
}

impl WriterProxy<SegmentWriter> for SegmentWriterProxy {
    fn materialize(self: Box<Self>, key: &PartitionKey) -> Result<SegmentWriter> {
        let SegmentWriterProxy { storage, config } = *self;
        SegmentWriter::open(storage, key.as_str(), config)
    }
}
