//! JSON-lines segment writer.
//!
//! A [`SegmentWriter`] owns one partition of an index for as long as it is
//! open: it takes the partition's storage lock on open and gives it back on
//! close. Documents are buffered in memory and written out as one segment
//! file per commit, named `<partition>.<writer-id>.<seq>.jsonl`. The writer id
//! is a fresh UUID per open writer, so a partition reopened later never
//! overwrites earlier segments.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuiverError, Result};
use crate::storage::{Storage, StorageLock};
use crate::writer::IndexWriter;
use crate::writer::document::Document;

const SEGMENT_SUFFIX: &str = ".jsonl";

/// Configuration for segment writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentWriterConfig {
    /// Commit automatically once this many documents are buffered (0 = never).
    pub auto_commit_threshold: usize,
}

impl Default for SegmentWriterConfig {
    fn default() -> Self {
        Self {
            auto_commit_threshold: 10000,
        }
    }
}

/// Statistics for one open writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterStats {
    /// Documents committed to segments.
    pub documents_committed: u64,

    /// Number of commits that wrote a segment.
    pub commit_count: u64,

    /// Bytes written across all segments.
    pub bytes_written: u64,

    /// Last commit timestamp.
    pub last_commit_time: Option<DateTime<Utc>>,
}

impl WriterStats {
    fn record_commit(&mut self, doc_count: u64, bytes: u64) {
        self.documents_committed += doc_count;
        self.bytes_written += bytes;
        self.commit_count += 1;
        self.last_commit_time = Some(Utc::now());
    }
}

/// Index writer for one partition, backed by a [`Storage`].
#[derive(Debug)]
pub struct SegmentWriter {
    partition: String,
    writer_id: Uuid,
    storage: Arc<dyn Storage>,
    lock: Option<Box<dyn StorageLock>>,
    config: SegmentWriterConfig,
    buffer: Vec<Document>,
    segments: Vec<String>,
    stats: WriterStats,
}

impl SegmentWriter {
    /// Open a writer for `partition`, taking its storage lock.
    ///
    /// Fails if another writer (in this process or another one sharing the
    /// storage) already holds the partition.
    pub fn open(
        storage: Arc<dyn Storage>,
        partition: &str,
        config: SegmentWriterConfig,
    ) -> Result<Self> {
        let lock = storage.acquire_lock(partition)?;
        let writer_id = Uuid::new_v4();
        debug!("opened segment writer {writer_id} for partition '{partition}'");

        Ok(Self {
            partition: partition.to_string(),
            writer_id,
            storage,
            lock: Some(lock),
            config,
            buffer: Vec::new(),
            segments: Vec::new(),
            stats: WriterStats::default(),
        })
    }

    /// The partition this writer owns.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Unique id of this writer instance.
    pub fn writer_id(&self) -> Uuid {
        self.writer_id
    }

    /// Statistics so far.
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Segment files written by this writer, in commit order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn check_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(QuiverError::index(format!(
                "writer for partition '{}' is closed",
                self.partition
            )));
        }
        Ok(())
    }

    fn segment_name(&self) -> String {
        format!(
            "{}.{}.{:05}{SEGMENT_SUFFIX}",
            self.partition,
            self.writer_id.simple(),
            self.segments.len()
        )
    }

    fn release_lock(&mut self) -> Result<()> {
        match self.lock.take() {
            Some(mut lock) => lock.release(),
            None => Ok(()),
        }
    }
}

impl IndexWriter for SegmentWriter {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_open()?;
        self.buffer.push(doc);

        let threshold = self.config.auto_commit_threshold;
        if threshold > 0 && self.buffer.len() >= threshold {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        let name = self.segment_name();
        let mut output = self.storage.create_output(&name)?;
        let mut bytes = 0u64;
        for doc in &self.buffer {
            let mut line = serde_json::to_vec(doc)?;
            line.push(b'\n');
            output.write_all(&line)?;
            bytes += line.len() as u64;
        }
        output.flush_and_sync()?;
        output.close()?;
        self.storage.sync()?;

        let doc_count = self.buffer.len() as u64;
        self.buffer.clear();
        self.stats.record_commit(doc_count, bytes);
        debug!(
            "committed {doc_count} documents to segment {name} ({bytes} bytes)"
        );
        self.segments.push(name);
        Ok(())
    }

    fn pending_docs(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if self.lock.is_none() {
            return Ok(());
        }

        // The lock goes back even if the final commit fails.
        let committed = self.commit();
        let released = self.release_lock();
        debug!(
            "closed segment writer {} for partition '{}'",
            self.writer_id, self.partition
        );
        committed.and(released)
    }

    fn is_closed(&self) -> bool {
        self.lock.is_none()
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if self.lock.is_some() && !self.buffer.is_empty() {
            warn!(
                "segment writer for partition '{}' dropped without close; {} buffered documents discarded",
                self.partition,
                self.buffer.len()
            );
        }
    }
}

/// Partition a segment file belongs to, or `None` if `name` is not a segment.
fn segment_partition(name: &str) -> Option<&str> {
    // <partition>.<writer-id>.<seq>.jsonl; the partition itself may contain dots.
    let stem = name.strip_suffix(SEGMENT_SUFFIX)?;
    let (rest, _seq) = stem.rsplit_once('.')?;
    let (partition, _writer) = rest.rsplit_once('.')?;
    Some(partition)
}

/// List the segment files of `partition`, sorted by name.
pub fn list_segments(storage: &dyn Storage, partition: &str) -> Result<Vec<String>> {
    Ok(storage
        .list_files()?
        .into_iter()
        .filter(|name| segment_partition(name) == Some(partition))
        .collect())
}

/// Partitions that have at least one segment in `storage`, sorted.
pub fn list_partitions(storage: &dyn Storage) -> Result<Vec<String>> {
    let mut partitions: Vec<String> = storage
        .list_files()?
        .iter()
        .filter_map(|name| segment_partition(name).map(str::to_string))
        .collect();
    partitions.sort();
    partitions.dedup();
    Ok(partitions)
}

/// Read every document of one segment file.
pub fn read_segment(storage: &dyn Storage, name: &str) -> Result<Vec<Document>> {
    let input = storage.open_input(name)?;
    let mut documents = Vec::new();
    for line in BufReader::new(input).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        documents.push(serde_json::from_str(&line)?);
    }
    Ok(documents)
}
