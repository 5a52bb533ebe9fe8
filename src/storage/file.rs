//! Directory-backed storage.
//!
//! Every file lives directly in one directory. A partition lock is a
//! `<partition>.lock` file created with `create_new`, which the OS makes
//! atomic, so two processes pointed at the same directory cannot both open
//! a writer for the same partition. The lock file holds the owner's pid.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{QuiverError, Result};
use crate::storage::traits::{
    Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput, validate_name,
};

const LOCK_SUFFIX: &str = ".lock";

/// Storage rooted at a single directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    config: StorageConfig,
}

impl FileStorage {
    /// Open `root` as storage, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P, config: StorageConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            QuiverError::storage(format!("cannot create {}: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(QuiverError::storage(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn lock_path(&self, partition: &str) -> Result<PathBuf> {
        validate_name(partition)?;
        Ok(self.root.join(format!("{partition}{LOCK_SUFFIX}")))
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.data_path(name)?).map_err(|e| StorageError::from_io(name, e))?;
        Ok(Box::new(BufReader::with_capacity(self.config.buffer_size, file)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = File::create(self.data_path(name)?).map_err(|e| StorageError::from_io(name, e))?;
        Ok(Box::new(SegmentFile {
            name: name.to_string(),
            writer: Some(BufWriter::with_capacity(self.config.buffer_size, file)),
            sync_writes: self.config.sync_writes,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.data_path(name).is_ok_and(|path| path.is_file())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            match file_name.to_str() {
                Some(name) if !name.ends_with(LOCK_SUFFIX) => names.push(name.to_string()),
                Some(_) => {}
                None => warn!("skipping non UTF-8 file name {file_name:?}"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata =
            fs::metadata(self.data_path(name)?).map_err(|e| StorageError::from_io(name, e))?;
        Ok(metadata.len())
    }

    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        let path = self.lock_path(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StorageError::from_io(name, e))?;

        Ok(Box::new(stamp_lock(path, file)?))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.lock_path(name).is_ok_and(|path| path.exists())
    }

    fn sync(&self) -> Result<()> {
        // Not every platform can fsync a directory.
        if let Ok(dir) = File::open(&self.root)
            && let Err(e) = dir.sync_all()
        {
            warn!("directory sync failed for {}: {e}", self.root.display());
        }
        Ok(())
    }
}

/// A segment file being written.
#[derive(Debug)]
struct SegmentFile {
    name: String,
    writer: Option<BufWriter<File>>,
    sync_writes: bool,
}

impl SegmentFile {
    fn open_writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{name} is closed")))
    }
}

impl Write for SegmentFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open_writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.open_writer()?.flush()
    }
}

impl StorageOutput for SegmentFile {
    fn flush_and_sync(&mut self) -> Result<()> {
        let sync_writes = self.sync_writes;
        let writer = self.open_writer()?;
        writer.flush()?;
        if sync_writes {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::from_io(&self.name, e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for SegmentFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to finish {}: {e}", self.name);
        }
    }
}

/// Record our pid in a lock file we just created.
///
/// The guard owns the path before the write, so a failed write removes the
/// file again instead of leaving the partition locked.
fn stamp_lock<F: Write>(path: PathBuf, mut file: F) -> Result<LockFile> {
    let lock = LockFile { path: Some(path) };
    writeln!(file, "{}", std::process::id())?;
    Ok(lock)
}

/// A held `<partition>.lock` file.
#[derive(Debug)]
struct LockFile {
    path: Option<PathBuf>,
}

impl StorageLock for LockFile {
    fn release(&mut self) -> Result<()> {
        if let Some(path) = self.path.take() {
            fs::remove_file(&path).map_err(|e| {
                QuiverError::storage(format!("cannot remove {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.path.is_some()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = fs::remove_file(path);
        }
    }
}
