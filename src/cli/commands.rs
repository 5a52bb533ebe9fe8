//! Command implementations for the Quiver CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::JobConfig;
use crate::error::{QuiverError, Result};
use crate::output::PooledOutput;
use crate::pool::{PartitionKey, SegmentWriterProxy, SlotKind, WriterPool};
use crate::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
use crate::writer::segment::{list_partitions, list_segments, read_segment};
use crate::writer::{Document, IndexWriter, SegmentWriter};

/// Execute a CLI command.
pub fn execute_command(args: QuiverArgs) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => build_index(build_args, &args),
        Command::Inspect(inspect_args) => inspect_index(inspect_args, &args),
    }
}

/// Build an index from a JSON-lines file.
fn build_index(args: &BuildArgs, cli_args: &QuiverArgs) -> Result<()> {
    let config = load_job_config(args)?;

    let storage: Arc<dyn Storage> = if args.dry_run {
        Arc::new(MemoryStorage::new())
    } else {
        let storage_config = StorageConfig {
            sync_writes: config.sync_writes,
            ..StorageConfig::default()
        };
        Arc::new(FileStorage::new(&args.output, storage_config)?)
    };

    if cli_args.verbosity() > 1 {
        println!("Reading documents from: {}", args.input.display());
    }
    let documents = read_documents(&args.input)?;
    let report = run_build(storage, &config, documents)?;

    output_result("Index built successfully", &report, cli_args)
}

/// Merge the config file (if any) with command-line overrides.
fn load_job_config(args: &BuildArgs) -> Result<JobConfig> {
    let mut config = match &args.config {
        Some(path) => JobConfig::from_file(path)?,
        None => JobConfig::default(),
    };

    if let Some(partitions) = args.partitions {
        config.partitions = partitions;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(key_field) = &args.key_field {
        config.key_field = Some(key_field.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    config.validate()?;
    Ok(config)
}

/// Read one document per non-empty line.
pub fn read_documents<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut documents = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = Document::from_json_str(&line)
            .map_err(|e| QuiverError::other(format!("line {}: {e}", line_no + 1)))?;
        documents.push(doc);
    }

    Ok(documents)
}

/// Partition index for the `position`-th document.
fn assign_partition(
    doc: &Document,
    position: usize,
    partitions: usize,
    key_field: Option<&str>,
) -> Result<usize> {
    match key_field {
        Some(field) => {
            let value = doc.get_text(field).ok_or_else(|| {
                QuiverError::other(format!(
                    "document {} has no '{field}' field",
                    position + 1
                ))
            })?;
            Ok(crc32fast::hash(value.as_bytes()) as usize % partitions)
        }
        None => Ok(position % partitions),
    }
}

/// Run a full indexing job: one proxy per partition, documents written by a
/// worker pool in batches, every touched partition committed, then the
/// writer pool cleaned.
pub fn run_build(
    storage: Arc<dyn Storage>,
    config: &JobConfig,
    documents: Vec<Document>,
) -> Result<BuildReport> {
    config.validate()?;
    let start = Instant::now();
    let document_count = documents.len();

    let pool: Arc<WriterPool<SegmentWriter>> =
        Arc::new(WriterPool::with_config(config.pool.clone()));
    let keys: Vec<PartitionKey> = (0..config.partitions).map(PartitionKey::numbered).collect();
    for key in &keys {
        pool.check_in_proxy(
            key.as_str(),
            SegmentWriterProxy::new(storage.clone(), config.writer.clone()),
        )?;
    }

    let mut per_partition: Vec<Vec<Document>> = vec![Vec::new(); config.partitions];
    for (position, doc) in documents.into_iter().enumerate() {
        let partition = assign_partition(
            &doc,
            position,
            config.partitions,
            config.key_field.as_deref(),
        )?;
        per_partition[partition].push(doc);
    }

    // Interleave batches across partitions so concurrent workers mostly
    // land on different keys.
    let mut chunked: Vec<std::vec::IntoIter<Vec<Document>>> = per_partition
        .into_iter()
        .map(|docs| {
            let mut batches = Vec::new();
            let mut docs = docs.into_iter().peekable();
            while docs.peek().is_some() {
                batches.push(docs.by_ref().take(config.batch_size).collect());
            }
            batches.into_iter()
        })
        .collect();
    let mut tasks: Vec<(usize, Vec<Document>)> = Vec::new();
    loop {
        let before = tasks.len();
        for (partition, batches) in chunked.iter_mut().enumerate() {
            if let Some(batch) = batches.next() {
                tasks.push((partition, batch));
            }
        }
        if tasks.len() == before {
            break;
        }
    }
    info!(
        "indexing {document_count} documents into {} partitions ({} batches, {} workers)",
        config.partitions,
        tasks.len(),
        config.workers
    );

    let output = PooledOutput::new(Arc::clone(&pool), config.retry.clone());
    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| {
            QuiverError::Anyhow(anyhow::Error::from(e).context("failed to start workers"))
        })?;

    workers.install(|| {
        tasks.into_par_iter().try_for_each(|(partition, batch)| {
            let key = keys[partition].as_str();
            debug!("writing {} documents to '{key}'", batch.len());
            output.with_partition(key, |writer| {
                for doc in batch {
                    writer.add_document(doc)?;
                }
                Ok(())
            })
        })
    })?;

    let mut partitions_written = 0;
    for key in &keys {
        if pool.slot_kind(key.as_str()) == Some(SlotKind::IdleProxy) {
            continue;
        }
        output.with_partition(key.as_str(), |writer| writer.commit())?;
        partitions_written += 1;
    }

    let pool_stats = pool.stats();
    pool.clean()?;

    let mut segments = 0;
    for key in &keys {
        segments += list_segments(storage.as_ref(), key.as_str())?.len();
    }

    let elapsed = start.elapsed();
    let docs_per_second = if elapsed.as_secs_f64() > 0.0 {
        document_count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    Ok(BuildReport {
        documents: document_count,
        partitions: config.partitions,
        partitions_written,
        segments,
        duration_ms: elapsed.as_millis() as u64,
        docs_per_second,
        pool: pool_stats,
    })
}

/// Show what an index directory contains.
fn inspect_index(args: &InspectArgs, cli_args: &QuiverArgs) -> Result<()> {
    if !args.index_path.is_dir() {
        return Err(QuiverError::other(format!(
            "index directory not found: {}",
            args.index_path.display()
        )));
    }

    let storage = FileStorage::new(&args.index_path, StorageConfig::default())?;
    let report = inspect_storage(&storage, args.count_docs)?;
    let message = format!("Index at {}", args.index_path.display());

    output_result(&message, &report, cli_args)
}

/// Summarize the partitions in `storage`.
pub fn inspect_storage(storage: &dyn Storage, count_docs: bool) -> Result<InspectReport> {
    let mut partitions = Vec::new();

    for partition in list_partitions(storage)? {
        let segments = list_segments(storage, &partition)?;
        let mut bytes = 0;
        let mut documents = 0;
        for segment in &segments {
            bytes += storage.file_size(segment)?;
            if count_docs {
                documents += read_segment(storage, segment)?.len() as u64;
            }
        }

        partitions.push(PartitionReport {
            locked: storage.lock_exists(&partition),
            partition,
            segments: segments.len(),
            bytes,
            documents: count_docs.then_some(documents),
        });
    }

    Ok(InspectReport { partitions })
}
