//! Durable key-value storage for client-side state

use crate::error::StorageError;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String values stored under string keys
///
/// Calls are synchronous: a successful `save` means the value is durable.
pub trait KeyValueStorage: Send + Sync {
    /// Value stored under `key`, or `None` if nothing was ever saved
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Stores values under `dir`, created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the value files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;

        // write-then-rename so a crash never leaves a half-written file
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(path = %path.display(), "Saved {}", key);
        Ok(())
    }
}

/// In-memory storage; values live as long as the instance
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
