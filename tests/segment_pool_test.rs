use quiver::cli::{inspect_storage, read_documents, run_build};
use quiver::config::JobConfig;
use quiver::error::{QuiverError, Result};
use quiver::pool::{PartitionKey, SegmentWriterProxy, SlotKind, WriterPool};
use quiver::storage::{FileStorage, Storage, StorageConfig};
use quiver::writer::segment::{list_partitions, list_segments, read_segment};
use quiver::writer::{Document, IndexWriter, SegmentWriter, SegmentWriterConfig};

use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

fn file_storage(path: &std::path::Path) -> Arc<dyn Storage> {
    Arc::new(FileStorage::new(path, StorageConfig::default()).unwrap())
}

fn proxy(storage: &Arc<dyn Storage>) -> SegmentWriterProxy {
    SegmentWriterProxy::new(storage.clone(), SegmentWriterConfig::default())
}

/// Segment writer whose first close waits on a gate twice: on entry and
/// before releasing its partition lock.
#[derive(Debug)]
struct GatedWriter {
    inner: SegmentWriter,
    gate: Option<Arc<Barrier>>,
}

impl IndexWriter for GatedWriter {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.inner.add_document(doc)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn pending_docs(&self) -> u64 {
        self.inner.pending_docs()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(gate) = self.gate.take() {
            gate.wait();
            gate.wait();
        }
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[test]
fn test_pooled_writers_persist_segments() {
    let dir = tempdir().unwrap();
    let storage = file_storage(dir.path());
    let pool: WriterPool<SegmentWriter> = WriterPool::new();

    for key in ["p0", "p1"] {
        pool.check_in_proxy(key, proxy(&storage)).unwrap();
    }
    assert_eq!(pool.slot_kind("p0"), Some(SlotKind::IdleProxy));
    // Registering a proxy opens nothing.
    assert!(!storage.lock_exists("p0"));

    for round in 0..3 {
        for key in ["p0", "p1"] {
            let handle = pool.check_out(key).unwrap();
            handle
                .add_document(Document::new().with_field("round", round).with_field("key", key))
                .unwrap();
            pool.check_in(key, handle).unwrap();
        }
    }
    assert!(storage.lock_exists("p0"));
    assert_eq!(pool.stats().materializations, 2);

    pool.clean().unwrap();
    assert!(!storage.lock_exists("p0"));
    assert!(!storage.lock_exists("p1"));

    assert_eq!(list_partitions(storage.as_ref()).unwrap(), vec!["p0", "p1"]);
    let segments = list_segments(storage.as_ref(), "p1").unwrap();
    assert_eq!(segments.len(), 1);
    let docs = read_segment(storage.as_ref(), &segments[0]).unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[2].get_text("key").as_deref(), Some("p1"));
}

#[test]
fn test_two_pools_cannot_share_a_partition() {
    let dir = tempdir().unwrap();
    let first: WriterPool<SegmentWriter> = WriterPool::new();
    let second: WriterPool<SegmentWriter> = WriterPool::new();
    let storage_a = file_storage(dir.path());
    let storage_b = file_storage(dir.path());

    first.check_in_proxy("shared", proxy(&storage_a)).unwrap();
    second.check_in_proxy("shared", proxy(&storage_b)).unwrap();

    let held = first.check_out("shared").unwrap();
    let err = second.check_out("shared").unwrap_err();
    assert!(matches!(err, QuiverError::ResourceCreationFailed { .. }));
    assert!(!second.contains("shared"));

    first.check_in("shared", held).unwrap();
    first.remove("shared").unwrap();

    second.check_in_proxy("shared", proxy(&storage_b)).unwrap();
    assert!(second.check_out("shared").is_ok());
}

#[test]
fn test_removed_writer_commits_buffered_documents() {
    let dir = tempdir().unwrap();
    let storage = file_storage(dir.path());
    let pool: WriterPool<SegmentWriter> = WriterPool::new();

    let writer = SegmentWriter::open(storage.clone(), "eager", SegmentWriterConfig::default())
        .unwrap();
    pool.check_in("eager", writer.into()).unwrap();

    let handle = pool.check_out("eager").unwrap();
    handle.add_document(Document::new().with_field("id", 1)).unwrap();
    assert_eq!(handle.pending_docs(), 1);
    pool.check_in("eager", handle.clone()).unwrap();

    pool.remove("eager").unwrap();
    assert!(handle.is_closed());
    assert!(handle.lock().is_closed());

    let segments = list_segments(storage.as_ref(), "eager").unwrap();
    assert_eq!(segments.len(), 1);
    assert!(!storage.lock_exists("eager"));
}

#[test]
fn test_build_and_inspect_directory() {
    let input_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();

    let input_path = input_dir.path().join("docs.jsonl");
    let mut input = std::fs::File::create(&input_path).unwrap();
    for i in 0..250 {
        writeln!(input, r#"{{"id": "doc-{i}", "body": "text {i}"}}"#).unwrap();
    }
    drop(input);

    let documents = read_documents(&input_path).unwrap();
    assert_eq!(documents.len(), 250);

    let config = JobConfig {
        partitions: 4,
        workers: 3,
        batch_size: 16,
        key_field: Some("id".to_string()),
        ..JobConfig::default()
    };
    let storage = file_storage(index_dir.path());
    let report = run_build(storage, &config, documents).unwrap();
    assert_eq!(report.documents, 250);
    assert_eq!(report.partitions, 4);
    assert_eq!(report.pool.creation_failures, 0);
    assert_eq!(report.pool.close_failures, 0);

    // Reopen the directory the way `inspect` does.
    let reopened = FileStorage::new(index_dir.path(), StorageConfig::default()).unwrap();
    let inspected = inspect_storage(&reopened, true).unwrap();
    assert_eq!(inspected.partitions.len(), report.partitions_written);
    assert!(inspected.partitions.iter().all(|p| !p.locked && p.bytes > 0));
    let total: u64 = inspected
        .partitions
        .iter()
        .map(|p| p.documents.unwrap_or(0))
        .sum();
    assert_eq!(total, 250);
}

#[test]
fn test_stale_lock_blocks_partition() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("p0.lock"), "12345\n").unwrap();

    let storage = file_storage(dir.path());
    let pool: WriterPool<SegmentWriter> = WriterPool::new();
    pool.check_in_proxy("p0", proxy(&storage)).unwrap();

    let err = pool.check_out("p0").unwrap_err();
    assert!(matches!(err, QuiverError::ResourceCreationFailed { .. }));
    assert_eq!(pool.stats().creation_failures, 1);
}

#[test]
fn test_replaced_writer_unlocks_partition_before_next_open() {
    let dir = tempdir().unwrap();
    let storage = file_storage(dir.path());
    let pool: Arc<WriterPool<GatedWriter>> = Arc::new(WriterPool::new());
    let gate = Arc::new(Barrier::new(2));

    let first = GatedWriter {
        inner: SegmentWriter::open(storage.clone(), "p0", SegmentWriterConfig::default())
            .unwrap(),
        gate: Some(gate.clone()),
    };
    pool.check_in("p0", first.into()).unwrap();

    let replacing = {
        let pool = Arc::clone(&pool);
        let storage = storage.clone();
        thread::spawn(move || {
            pool.check_in_fn("p0", move |key: &PartitionKey| {
                let inner =
                    SegmentWriter::open(storage, key.as_str(), SegmentWriterConfig::default())?;
                Ok(GatedWriter { inner, gate: None })
            })
        })
    };

    // The old writer is closing but still holds p0.lock.
    gate.wait();
    assert!(storage.lock_exists("p0"));
    assert!(pool.check_out("p0").unwrap_err().is_already_in_use());
    gate.wait();
    replacing.join().unwrap().unwrap();

    let handle = pool.check_out("p0").unwrap();
    handle.add_document(Document::new().with_field("id", 1)).unwrap();
    pool.check_in("p0", handle).unwrap();
    assert_eq!(pool.stats().creation_failures, 0);

    pool.clean().unwrap();
    assert!(!storage.lock_exists("p0"));
}
