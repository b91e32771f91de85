//! Locked reads and atomic rewrites of whole-file JSON state.
//!
//! Readers take a shared lock on the data file. Writers hold an exclusive
//! lock on a `<file>.lock` sidecar for the whole load, modify and persist
//! cycle, so concurrent processes serialize their read-modify-write and never
//! rewrite from a stale snapshot. The data file itself is only ever replaced
//! by rename.

use crate::{Error, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Exclusive writer lock on `<path>.lock`, released on drop
#[derive(Debug)]
pub(crate) struct WriteLock {
    file: File,
}

impl WriteLock {
    /// Block until no other writer holds the lock for `path`
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent_of(path)?)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path(path))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release write lock: {}", e);
        }
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn parent_of(path: &Path) -> Result<&Path> {
    path.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{:?} has no parent directory", path),
        ))
    })
}

/// Read the whole file under a shared lock; `None` if it doesn't exist
pub(crate) fn read_shared(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    Ok(Some(contents))
}

/// Atomically replace `path` with `value` as JSON: temp file, fsync, rename
///
/// Callers rewriting existing state hold a [`WriteLock`] around the
/// load that produced `value`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = parent_of(path)?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
