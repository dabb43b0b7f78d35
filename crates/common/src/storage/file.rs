//! Browser-wide storage backed by a single JSON file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::StorageAdapter;
use crate::error::{ApiError, ApiResult};

const FILE_NAME: &str = "restline-storage.json";

/// One write lock per storage file, shared by every instance in the process.
static WRITE_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = Lazy::new(Mutex::default);

fn write_lock_for(path: &Path) -> Arc<Mutex<()>> {
    WRITE_LOCKS.lock().entry(path.to_path_buf()).or_default().clone()
}

/// JSON-file storage shared by every client using the same directory.
///
/// The file is re-read on every access so separate instances observe each
/// other's writes. Read-modify-write cycles are serialised per file across
/// all instances in the process; each write goes to its own temp file in the
/// same directory and is renamed into place.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Storage rooted at `dir`, created if missing.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> ApiResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| ApiError::Storage(format!("create {}: {e}", dir.display())))?;
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let path = dir.join(FILE_NAME);
        Ok(Self { write_lock: write_lock_for(&path), path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> ApiResult<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(ApiError::Storage(format!("read {}: {e}", self.path.display())))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).or_else(|e| {
            // Corrupt file reads as empty.
            warn!(path = %self.path.display(), error = %e, "discarding unreadable storage file");
            Ok(BTreeMap::new())
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> ApiResult<()> {
        let serialized = serde_json::to_string_pretty(entries)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| ApiError::Storage(format!("temp file in {}: {e}", dir.display())))?;
        tmp.write_all(serialized.as_bytes())
            .map_err(|e| ApiError::Storage(format!("write {}: {e}", tmp.path().display())))?;
        tmp.persist(&self.path)
            .map_err(|e| ApiError::Storage(format!("rename onto {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> ApiResult<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> ApiResult<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)?;
        debug!(key, "stored browser-scope entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> ApiResult<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}
