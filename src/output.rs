//! Job-facing access to pooled writers.
//!
//! An indexing job only needs two things from the pool: "give me something I
//! can write documents to for partition K" and "I'm done with partition K".
//! [`PartitionOutput`] is that contract; [`PooledOutput`] implements it on top
//! of a shared [`WriterPool`], adding the retry-on-busy policy the pool
//! deliberately leaves to its callers.

use std::sync::Arc;

use log::warn;

use crate::config::RetryPolicy;
use crate::error::{QuiverError, Result};
use crate::pool::{WriterHandle, WriterPool};
use crate::writer::IndexWriter;

/// The two operations an indexing job performs against its output.
pub trait PartitionOutput {
    /// Document-writable sink for one partition.
    type Sink;

    /// Claim partition `key` and get its sink.
    fn open_partition(&self, key: &str) -> Result<Self::Sink>;

    /// Give partition `key` back.
    fn close_partition(&self, key: &str, sink: Self::Sink) -> Result<()>;
}

/// [`PartitionOutput`] backed by a [`WriterPool`].
pub struct PooledOutput<W: IndexWriter + 'static> {
    pool: Arc<WriterPool<W>>,
    retry: RetryPolicy,
    commit_on_close: bool,
}

impl<W: IndexWriter + 'static> PooledOutput<W> {
    /// Wrap a pool. Busy partitions are retried per `retry`.
    pub fn new(pool: Arc<WriterPool<W>>, retry: RetryPolicy) -> Self {
        Self {
            pool,
            retry,
            commit_on_close: false,
        }
    }

    /// Commit the writer every time a partition is closed.
    pub fn with_commit_on_close(mut self, commit_on_close: bool) -> Self {
        self.commit_on_close = commit_on_close;
        self
    }

    pub fn pool(&self) -> &Arc<WriterPool<W>> {
        &self.pool
    }

    /// Open `key`, run `f` with the writer locked, and close `key` again.
    ///
    /// The partition is returned to the pool even when `f` fails or panics.
    pub fn with_partition<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut W) -> Result<T>,
    {
        let sink = self.open_partition(key)?;
        let claim = Claim {
            pool: &self.pool,
            key,
            sink: Some(sink.clone()),
        };
        let result = {
            let mut writer = sink.lock();
            f(&mut writer)
        };
        claim.disarm();
        let closed = self.close_partition(key, sink);

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("failed to release partition '{key}' after error: {close_err}");
                }
                Err(e)
            }
        }
    }
}

/// Checks a partition back in if the closure holding it unwinds.
struct Claim<'a, W: IndexWriter + 'static> {
    pool: &'a WriterPool<W>,
    key: &'a str,
    sink: Option<WriterHandle<W>>,
}

impl<W: IndexWriter + 'static> Claim<'_, W> {
    fn disarm(mut self) {
        self.sink = None;
    }
}

impl<W: IndexWriter + 'static> Drop for Claim<'_, W> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!("releasing partition '{}' after a panic", self.key);
            if let Err(e) = self.pool.check_in(self.key, sink) {
                warn!("failed to release partition '{}': {e}", self.key);
            }
        }
    }
}

impl<W: IndexWriter + 'static> PartitionOutput for PooledOutput<W> {
    type Sink = WriterHandle<W>;

    fn open_partition(&self, key: &str) -> Result<WriterHandle<W>> {
        self.retry
            .run(|| self.pool.check_out(key), QuiverError::is_already_in_use)
    }

    fn close_partition(&self, key: &str, sink: WriterHandle<W>) -> Result<()> {
        let committed = if self.commit_on_close {
            sink.commit()
        } else {
            Ok(())
        };
        self.pool.check_in(key, sink)?;
        committed
    }
}
