//! Sidecar persistence
//!
//! Read-modify-write of sidecar files with write-if-changed semantics. Writes
//! go through a temporary file in the target directory that is renamed into
//! place, so a sidecar is either fully updated or left as it was. Updates to
//! the same path are serialized; different paths proceed in parallel.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;
use track_index::Coordinate;

use crate::document::{SidecarDocument, SidecarError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The merge produced the bytes already on disk
    Unchanged,
}

/// Sidecar path for a photo: same stem, `.xmp` extension.
///
/// A path that already ends in `.xmp` has that extension stripped first, so
/// `IMG_1.CR3.xmp` and `IMG_1.CR3` both map to `IMG_1.xmp`.
pub fn sidecar_path(photo: &Path) -> PathBuf {
    let is_xmp = photo
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("xmp"));
    let base = if is_xmp {
        photo.with_extension("")
    } else {
        photo.to_path_buf()
    };
    base.with_extension("xmp")
}

#[derive(Default)]
pub struct SidecarStore {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SidecarStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the entry for `key` once no other caller holds its lock.
    fn release(&self, key: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Current document at `path`, `None` when the file does not exist.
    pub fn read(&self, path: &Path) -> Result<Option<SidecarDocument>, SidecarError> {
        match read_bytes(path)? {
            Some(bytes) => SidecarDocument::parse(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Apply `edit` to the sidecar at `path` and persist the result if it
    /// differs from what is on disk.
    ///
    /// Any error from `edit` aborts the update with the file untouched.
    pub fn update<F>(&self, path: &Path, edit: F) -> Result<WriteOutcome, SidecarError>
    where
        F: FnOnce(&mut SidecarDocument) -> Result<(), SidecarError>,
    {
        let key = lock_key(path);
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock();
            update_locked(path, edit)
        };
        self.release(&key, lock);
        result
    }

    /// GPS merge against the sidecar file at `path`.
    pub fn merge_gps(
        &self,
        path: &Path,
        coord: &Coordinate,
        timestamp: DateTime<Utc>,
        overwrite: bool,
    ) -> Result<WriteOutcome, SidecarError> {
        self.update(path, |doc| doc.update_gps(coord, timestamp, overwrite))
    }

    /// Keyword merge against the sidecar file at `path`.
    pub fn merge_keywords<S: AsRef<str>>(
        &self,
        path: &Path,
        tags: &[S],
        overwrite: bool,
    ) -> Result<WriteOutcome, SidecarError> {
        self.update(path, |doc| doc.merge_keywords(tags, overwrite))
    }
}

fn update_locked<F>(path: &Path, edit: F) -> Result<WriteOutcome, SidecarError>
where
    F: FnOnce(&mut SidecarDocument) -> Result<(), SidecarError>,
{
    let existing = read_bytes(path)?;
    let mut doc = match &existing {
        Some(bytes) => SidecarDocument::parse(bytes)?,
        None => SidecarDocument::new(),
    };
    edit(&mut doc)?;

    if existing.as_deref() == Some(doc.as_str().as_bytes()) {
        debug!(path = %path.display(), "sidecar unchanged");
        return Ok(WriteOutcome::Unchanged);
    }

    write_atomic(path, doc.as_str().as_bytes())?;
    debug!(path = %path.display(), "sidecar written");
    Ok(WriteOutcome::Written)
}

/// Lock key for a sidecar: the path with its parent directory resolved, so
/// different spellings of one file share a lock.
fn lock_key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SidecarError {
    SidecarError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, SidecarError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(path, err)),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SidecarError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}
