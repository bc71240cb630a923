//! Key-value persistence for drafts and the sequence counter.
//!
//! [`FileStore`] keeps one file per key under a root directory. [`MemoryStore`] is used by tests
//! and by hosts that do not want anything written to disk.

use crate::{LaudoError, LaudoResult};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String-keyed store holding string values.
///
/// Implementations must be safe to share between the session task and blocking workers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> LaudoResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> LaudoResult<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> LaudoResult<()>;
}

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> LaudoResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(LaudoError::InvalidInput(format!(
                "invalid store key: {key:?}"
            )));
        }
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> LaudoResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LaudoError::Storage(e)),
        }
    }

    /// Writes to a sibling temporary file and renames it over the key, so a crash mid-write
    /// leaves the previous value in place.
    fn set(&self, key: &str, value: &str) -> LaudoResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(LaudoError::Storage)?;

        let tmp = self.root.join(format!(".{key}.tmp"));
        fs::write(&tmp, value).map_err(LaudoError::Storage)?;
        fs::rename(&tmp, &path).map_err(LaudoError::Storage)
    }

    fn remove(&self, key: &str) -> LaudoResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LaudoError::Storage(e)),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> LaudoResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> LaudoResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> LaudoResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}
